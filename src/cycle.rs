//! A selection cycle: a named SELEX round's id→count multiset (spec.md
//! §4.4).

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use thiserror::Error;
use tracing::trace;

use crate::bloom::{BloomError, BloomIndex};
use crate::config::{BloomConfig, CycleConfig};
use crate::directory;
use crate::experiment::Experiment;
use crate::pool::{AptamerPool, PoolError};
use crate::store::{Store, StoreError};

/// Errors returned by [`SelectionCycle`] operations.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Error from the cycle's count store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error from the cycle's Bloom index.
    #[error("bloom error: {0}")]
    Bloom(#[from] BloomError),

    /// Error registering the sequence against the pool.
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    /// A lock guarding cycle state was poisoned by a panicking thread.
    #[error("cycle lock poisoned")]
    LockPoisoned,
}

/// A single SELEX round's multiset of aptamer ids, with exact cardinalities
/// (spec.md §3). Created lazily on first registration of its round; counts
/// only ever increase.
pub struct SelectionCycle {
    round: u32,
    name: String,
    barcode5: Option<Vec<u8>>,
    barcode3: Option<Vec<u8>>,
    is_control: bool,
    is_counter: bool,
    counts: RwLock<Store>,
    bloom: RwLock<BloomIndex>,
    size: AtomicU64,
    unique_size: AtomicU64,
    experiment: Weak<Experiment>,
}

impl SelectionCycle {
    /// Open (or create) the store/Bloom pair for `config` under `root`,
    /// holding a weak back-reference to the owning experiment for
    /// [`SelectionCycle::next_cycle`]/[`SelectionCycle::previous_cycle`]
    /// navigation (spec.md §9: cycles never own their experiment).
    pub fn open(
        root: &Path,
        config: CycleConfig,
        bloom_cfg: BloomConfig,
        experiment: Weak<Experiment>,
    ) -> Result<Self, CycleError> {
        std::fs::create_dir_all(root.join(directory::CYCLE_DIR))?;

        let store_path = directory::cycle_store_path(root, config.round, &config.name);
        let bloom_path = directory::cycle_bloom_path(root, config.round, &config.name);

        let counts = Store::open(&store_path)?;
        let bloom = if bloom_path.exists() {
            BloomIndex::load(&bloom_path)?
        } else {
            BloomIndex::new(bloom_cfg.capacity, bloom_cfg.fp_rate)?
        };

        let mut size = 0u64;
        for (_, count_bytes) in counts.range_iter() {
            size += u32_from_bytes(&count_bytes) as u64;
        }
        let unique_size = counts.size() as u64;

        Ok(Self {
            round: config.round,
            name: config.name,
            barcode5: config.barcode5,
            barcode3: config.barcode3,
            is_control: config.is_control,
            is_counter: config.is_counter,
            counts: RwLock::new(counts),
            bloom: RwLock::new(bloom),
            size: AtomicU64::new(size),
            unique_size: AtomicU64::new(unique_size),
            experiment,
        })
    }

    /// Round number this cycle belongs to.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Stable name distinguishing this cycle within its round.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured 5' barcode, if any.
    pub fn barcode5(&self) -> Option<&[u8]> {
        self.barcode5.as_deref()
    }

    /// Configured 3' barcode, if any.
    pub fn barcode3(&self) -> Option<&[u8]> {
        self.barcode3.as_deref()
    }

    /// Whether this cycle is a negative control.
    pub fn is_control(&self) -> bool {
        self.is_control
    }

    /// Whether this cycle is a counter-selection.
    pub fn is_counter(&self) -> bool {
        self.is_counter
    }

    /// Register `sequence` in `pool` and increment its count in this
    /// cycle. Initializes the count to 1 on first sight. A Bloom miss is
    /// treated as definite-absent; a Bloom hit is confirmed against the
    /// count store to tolerate false positives.
    pub fn add(
        &self,
        pool: &AptamerPool,
        sequence: &[u8],
        primer5_trim: u32,
        primer3_trim: u32,
    ) -> Result<u32, CycleError> {
        let id = pool.register(sequence, primer5_trim, primer3_trim)?;
        let id_bytes = id.to_le_bytes();

        let mut counts = self.counts.write().map_err(|_| CycleError::LockPoisoned)?;
        let maybe_present = self
            .bloom
            .read()
            .map_err(|_| CycleError::LockPoisoned)?
            .maybe_contains(&id_bytes);

        let existing = if maybe_present {
            counts.get(&id_bytes).map(|b| u32_from_bytes(&b))
        } else {
            None
        };

        let new_count = existing.unwrap_or(0) + 1;
        counts.put(&id_bytes, &new_count.to_le_bytes());
        if existing.is_none() {
            self.unique_size.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut bloom) = self.bloom.write() {
                bloom.add(&id_bytes);
            }
        }
        self.size.fetch_add(1, Ordering::SeqCst);

        trace!(round = self.round, cycle = %self.name, id, count = new_count, "cycle updated");
        Ok(id)
    }

    /// Whether `sequence`'s id (if registered in the pool) has a nonzero
    /// count in this cycle.
    pub fn contains(&self, pool: &AptamerPool, sequence: &[u8]) -> Result<bool, CycleError> {
        Ok(self.count_of(pool, sequence)? > 0)
    }

    /// The count of `sequence` in this cycle (0 if never added, or never
    /// registered in the pool).
    pub fn count_of(&self, pool: &AptamerPool, sequence: &[u8]) -> Result<u32, CycleError> {
        let Some(id) = pool.identifier_of(sequence)? else {
            return Ok(0);
        };
        let id_bytes = id.to_le_bytes();
        let maybe_present = self
            .bloom
            .read()
            .map_err(|_| CycleError::LockPoisoned)?
            .maybe_contains(&id_bytes);
        if !maybe_present {
            return Ok(0);
        }
        let counts = self.counts.read().map_err(|_| CycleError::LockPoisoned)?;
        Ok(counts.get(&id_bytes).map(|b| u32_from_bytes(&b)).unwrap_or(0))
    }

    /// Total registrations across this cycle (Σ counts).
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::SeqCst)
    }

    /// Number of distinct ids with a nonzero count in this cycle.
    pub fn unique_size(&self) -> u64 {
        self.unique_size.load(Ordering::SeqCst)
    }

    /// The next cycle after this one in the owning experiment's ordered
    /// list, if any.
    pub fn next_cycle(&self) -> Option<Arc<SelectionCycle>> {
        let experiment = self.experiment.upgrade()?;
        experiment.cycle_after(self.round, &self.name)
    }

    /// The previous cycle before this one in the owning experiment's
    /// ordered list, if any.
    pub fn previous_cycle(&self) -> Option<Arc<SelectionCycle>> {
        let experiment = self.experiment.upgrade()?;
        experiment.cycle_before(self.round, &self.name)
    }

    /// Flush the count store and Bloom filter to disk.
    pub fn flush(&self, root: &Path) -> Result<(), CycleError> {
        self.counts.write().map_err(|_| CycleError::LockPoisoned)?.flush()?;
        self.bloom
            .read()
            .map_err(|_| CycleError::LockPoisoned)?
            .save(&directory::cycle_bloom_path(root, self.round, &self.name))?;
        Ok(())
    }
}

fn u32_from_bytes(bytes: &[u8]) -> u32 {
    let mut arr = [0u8; 4];
    let n = bytes.len().min(4);
    arr[..n].copy_from_slice(&bytes[..n]);
    u32::from_le_bytes(arr)
}
