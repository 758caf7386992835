//! The persistent aptamer pool (spec.md §4.3): a sequence↔id bijection plus
//! randomized-region bounds.

use std::path::Path;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;
use tracing::{debug, trace};

use crate::bloom::{BloomError, BloomIndex};
use crate::directory;
use crate::store::{Store, StoreError};

/// Errors returned by [`AptamerPool`] operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Error from one of the pool's stores.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error from one of the pool's Bloom indices.
    #[error("bloom error: {0}")]
    Bloom(#[from] BloomError),

    /// A lock guarding pool state was poisoned by a panicking thread.
    #[error("pool lock poisoned")]
    LockPoisoned,

    /// `bounds_of` was called with an id the pool never assigned.
    #[error("unknown aptamer id {0}")]
    UnknownId(u32),
}

/// The matched 5'/3' primer offsets bracketing an aptamer's randomized
/// region, per spec.md §3. `0 <= start <= end <= length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    /// Offset where the randomized region begins (end of the 5' primer).
    pub start: u32,
    /// Offset where the randomized region ends (start of the 3' primer).
    pub end: u32,
}

impl Bounds {
    fn to_bytes(self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[0..4].copy_from_slice(&self.start.to_le_bytes());
        buf[4..8].copy_from_slice(&self.end.to_le_bytes());
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 8 {
            return None;
        }
        let start = u32::from_le_bytes(bytes[0..4].try_into().ok()?);
        let end = u32::from_le_bytes(bytes[4..8].try_into().ok()?);
        Some(Self { start, end })
    }
}

struct Inner {
    seq_to_id: Store,
    id_to_bounds: Store,
}

/// The persistent, content-addressed aptamer pool.
///
/// Owns two stores (`seq_to_id`, `id_to_bounds`) and two Bloom indices
/// (over sequence bytes, and over assigned ids), matching spec.md §4.3.
/// The inner stores are guarded by a single `RwLock`: `register` takes the
/// write lock; every read-only query takes the read lock. This realizes
/// the structural, not-merely-advisory single-writer discipline called for
/// in SPEC_FULL.md's Open Question resolution — AptaPlex consumers never
/// touch these stores directly, they go through [`AptamerPool::register`].
pub struct AptamerPool {
    inner: RwLock<Inner>,
    seq_bloom: RwLock<BloomIndex>,
    id_bloom: RwLock<BloomIndex>,
    next_id: AtomicU32,
}

impl AptamerPool {
    /// Open (or create) the pool rooted at `root`, sizing its Bloom
    /// indices from `(bloom_capacity, bloom_fp_rate)`.
    pub fn open(root: &Path, bloom_capacity: usize, bloom_fp_rate: f64) -> Result<Self, PoolError> {
        directory::create_dirs_if_missing(root)?;
        let pool_dir = root.join(directory::POOL_DIR);

        let seq_to_id = Store::open(pool_dir.join(directory::SEQ_TO_ID_FILE))?;
        let id_to_bounds = Store::open(pool_dir.join(directory::ID_TO_BOUNDS_FILE))?;
        let next_id = seq_to_id.size() as u32;

        let bloom_path = pool_dir.join(directory::POOL_BLOOM_FILE);
        let seq_bloom = if bloom_path.exists() {
            BloomIndex::load(&bloom_path)?
        } else {
            BloomIndex::new(bloom_capacity, bloom_fp_rate)?
        };
        // Ids are sequential; seed the id bloom from everything already
        // assigned so reopening a closed pool preserves membership.
        let mut id_bloom = BloomIndex::new(bloom_capacity, bloom_fp_rate)?;
        for id in 0..next_id {
            id_bloom.add(&id.to_le_bytes());
        }

        debug!(next_id, "pool opened");
        Ok(Self {
            inner: RwLock::new(Inner {
                seq_to_id,
                id_to_bounds,
            }),
            seq_bloom: RwLock::new(seq_bloom),
            id_bloom: RwLock::new(id_bloom),
            next_id: AtomicU32::new(next_id),
        })
    }

    /// Register `sequence`, returning its id. If the sequence was already
    /// registered, returns the existing id unchanged — idempotent per
    /// spec.md §8 invariant 1.
    ///
    /// `primer5_trim`/`primer3_trim` are only consulted on first
    /// registration; bounds are assigned once and never mutated (spec.md
    /// §3).
    pub fn register(
        &self,
        sequence: &[u8],
        primer5_trim: u32,
        primer3_trim: u32,
    ) -> Result<u32, PoolError> {
        if let Some(id) = self.identifier_of(sequence)? {
            return Ok(id);
        }

        let mut inner = self.inner.write().map_err(|_| PoolError::LockPoisoned)?;
        // Re-check under the write lock: another caller may have
        // registered this sequence between our bloom check and acquiring
        // the lock.
        if let Some(existing) = inner.seq_to_id.get(sequence) {
            return Ok(u32_from_bytes(&existing));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let length = sequence.len() as u32;
        let bounds = Bounds {
            start: primer5_trim,
            end: length.saturating_sub(primer3_trim),
        };

        inner.seq_to_id.put(sequence, &id.to_le_bytes());
        inner.id_to_bounds.put(&id.to_le_bytes(), &bounds.to_bytes());
        drop(inner);

        if let Ok(mut sb) = self.seq_bloom.write() {
            sb.add(sequence);
        }
        if let Ok(mut ib) = self.id_bloom.write() {
            ib.add(&id.to_le_bytes());
        }

        trace!(id, len = length, "aptamer registered");
        Ok(id)
    }

    /// Look up the id of `sequence`, or `None` if it has never been
    /// registered.
    pub fn identifier_of(&self, sequence: &[u8]) -> Result<Option<u32>, PoolError> {
        let maybe_present = self
            .seq_bloom
            .read()
            .map_err(|_| PoolError::LockPoisoned)?
            .maybe_contains(sequence);
        if !maybe_present {
            return Ok(None);
        }
        let inner = self.inner.read().map_err(|_| PoolError::LockPoisoned)?;
        Ok(inner.seq_to_id.get(sequence).map(|b| u32_from_bytes(&b)))
    }

    /// Look up the randomized-region bounds for `id`.
    pub fn bounds_of(&self, id: u32) -> Result<Bounds, PoolError> {
        let inner = self.inner.read().map_err(|_| PoolError::LockPoisoned)?;
        inner
            .id_to_bounds
            .get(&id.to_le_bytes())
            .and_then(|b| Bounds::from_bytes(&b))
            .ok_or(PoolError::UnknownId(id))
    }

    /// Iterate `(sequence, id)` pairs in id order.
    pub fn iter(&self) -> Result<Vec<(Vec<u8>, u32)>, PoolError> {
        let inner = self.inner.read().map_err(|_| PoolError::LockPoisoned)?;
        let mut items: Vec<(Vec<u8>, u32)> = inner
            .seq_to_id
            .range_iter()
            .map(|(seq, id_bytes)| (seq, u32_from_bytes(&id_bytes)))
            .collect();
        items.sort_by_key(|(_, id)| *id);
        Ok(items)
    }

    /// Total number of distinct aptamers registered (`next_id`).
    pub fn size(&self) -> u32 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Flush both stores and the sequence Bloom filter to disk.
    pub fn flush(&self, root: &Path) -> Result<(), PoolError> {
        let mut inner = self.inner.write().map_err(|_| PoolError::LockPoisoned)?;
        inner.seq_to_id.flush()?;
        inner.id_to_bounds.flush()?;
        drop(inner);

        let pool_dir = root.join(directory::POOL_DIR);
        self.seq_bloom
            .read()
            .map_err(|_| PoolError::LockPoisoned)?
            .save(&pool_dir.join(directory::POOL_BLOOM_FILE))?;
        Ok(())
    }

    /// Flush, releasing all store mappings. The pool becomes read-only in
    /// the sense that no further `register` calls should be issued after
    /// this point within the same process (spec.md §3's lifecycle note).
    pub fn close(&self, root: &Path) -> Result<(), PoolError> {
        self.flush(root)
    }
}

fn u32_from_bytes(bytes: &[u8]) -> u32 {
    let mut arr = [0u8; 4];
    let n = bytes.len().min(4);
    arr[..n].copy_from_slice(&bytes[..n]);
    u32::from_le_bytes(arr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn register_is_idempotent() {
        let dir = tempdir().unwrap();
        let pool = AptamerPool::open(dir.path(), 1000, 0.01).unwrap();

        let id1 = pool.register(b"ACGT", 0, 0).unwrap();
        let id2 = pool.register(b"ACGT", 0, 0).unwrap();
        let id3 = pool.register(b"TGCA", 0, 0).unwrap();

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
    }

    #[test]
    fn s1_tiny_pool_scenario() {
        let dir = tempdir().unwrap();
        let pool = AptamerPool::open(dir.path(), 1000, 0.01).unwrap();

        let a1 = pool.register(b"ACGT", 0, 0).unwrap();
        let a2 = pool.register(b"ACGT", 0, 0).unwrap();
        let b1 = pool.register(b"TGCA", 0, 0).unwrap();

        assert_eq!((a1, a2, b1), (0, 0, 1));
        assert_eq!(pool.size(), 2);
        assert_eq!(
            pool.bounds_of(0).unwrap(),
            Bounds { start: 0, end: 4 }
        );
    }

    #[test]
    fn s4_primer_trim_scenario() {
        let dir = tempdir().unwrap();
        let pool = AptamerPool::open(dir.path(), 1000, 0.01).unwrap();

        let read = b"AAACGTCGTTT";
        let id = pool.register(read, 3, 3).unwrap();
        let bounds = pool.bounds_of(id).unwrap();
        assert_eq!(bounds, Bounds { start: 3, end: 8 });
        assert_eq!(&read[bounds.start as usize..bounds.end as usize], b"CGTCG");
    }

    #[test]
    fn bounds_of_unknown_id_errors() {
        let dir = tempdir().unwrap();
        let pool = AptamerPool::open(dir.path(), 1000, 0.01).unwrap();
        assert!(matches!(pool.bounds_of(42), Err(PoolError::UnknownId(42))));
    }

    #[test]
    fn reopen_restores_size_and_ids() {
        let dir = tempdir().unwrap();
        {
            let pool = AptamerPool::open(dir.path(), 1000, 0.01).unwrap();
            pool.register(b"ACGTACGT", 0, 0).unwrap();
            pool.register(b"TTTTCCCC", 0, 0).unwrap();
            pool.close(dir.path()).unwrap();
        }
        let reopened = AptamerPool::open(dir.path(), 1000, 0.01).unwrap();
        assert_eq!(reopened.size(), 2);
        assert_eq!(reopened.identifier_of(b"ACGTACGT").unwrap(), Some(0));
        assert_eq!(reopened.identifier_of(b"TTTTCCCC").unwrap(), Some(1));
    }

    #[test]
    fn iter_is_in_id_order() {
        let dir = tempdir().unwrap();
        let pool = AptamerPool::open(dir.path(), 1000, 0.01).unwrap();
        pool.register(b"CCCC", 0, 0).unwrap();
        pool.register(b"AAAA", 0, 0).unwrap();
        pool.register(b"GGGG", 0, 0).unwrap();

        let items = pool.iter().unwrap();
        let ids: Vec<u32> = items.iter().map(|(_, id)| *id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
