//! The experiment: owns the aptamer pool and the ordered set of selection
//! cycles (spec.md §3, §9).

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, Weak};

use thiserror::Error;
use tracing::info;

use crate::config::{BloomConfig, CycleConfig};
use crate::cycle::{CycleError, SelectionCycle};
use crate::pool::{AptamerPool, PoolError};

/// Errors returned by [`Experiment`] operations.
#[derive(Debug, Error)]
pub enum ExperimentError {
    /// Error opening or operating on the pool.
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    /// Error opening or operating on a selection cycle.
    #[error("cycle error: {0}")]
    Cycle(#[from] CycleError),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A lock guarding the cycle list was poisoned by a panicking thread.
    #[error("experiment lock poisoned")]
    LockPoisoned,
}

/// Owns exactly one [`AptamerPool`] and an ordered list of
/// [`SelectionCycle`]s, indexed by round then declaration order (spec.md
/// §3). The experiment is the sole creator and closer of both; cycles hold
/// only a [`Weak`] back-reference to it for `next_cycle`/`previous_cycle`
/// navigation, never an owning one (spec.md §9).
///
/// Must be held behind an `Arc` so cycles created via
/// [`Experiment::open_cycle`] can hold a working back-reference.
pub struct Experiment {
    root: PathBuf,
    bloom: BloomConfig,
    pool: AptamerPool,
    cycles: RwLock<Vec<Arc<SelectionCycle>>>,
}

impl Experiment {
    /// Open (or create) the experiment rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, bloom: BloomConfig) -> Result<Arc<Self>, ExperimentError> {
        let root = root.into();
        let pool = AptamerPool::open(&root, bloom.capacity, bloom.fp_rate)?;
        info!(root = %root.display(), "experiment opened");
        Ok(Arc::new(Self {
            root,
            bloom,
            pool,
            cycles: RwLock::new(Vec::new()),
        }))
    }

    /// The owned aptamer pool.
    pub fn pool(&self) -> &AptamerPool {
        &self.pool
    }

    /// Project root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open or create the cycle described by `config`, inserting it into
    /// the ordered list (sorted by round, ties broken by insertion order).
    /// Returns the existing cycle if `(round, name)` was already opened.
    pub fn open_cycle(
        self: &Arc<Self>,
        config: CycleConfig,
    ) -> Result<Arc<SelectionCycle>, ExperimentError> {
        let mut cycles = self.cycles.write().map_err(|_| ExperimentError::LockPoisoned)?;
        if let Some(existing) = cycles
            .iter()
            .find(|c| c.round() == config.round && c.name() == config.name)
        {
            return Ok(Arc::clone(existing));
        }

        let cycle = Arc::new(SelectionCycle::open(
            &self.root,
            config,
            self.bloom,
            Arc::downgrade(self),
        )?);

        let insert_at = cycles
            .iter()
            .position(|c| c.round() > cycle.round())
            .unwrap_or(cycles.len());
        cycles.insert(insert_at, Arc::clone(&cycle));
        Ok(cycle)
    }

    /// All cycles at `round`, in declaration order.
    pub fn cycles_at(&self, round: u32) -> Result<Vec<Arc<SelectionCycle>>, ExperimentError> {
        let cycles = self.cycles.read().map_err(|_| ExperimentError::LockPoisoned)?;
        Ok(cycles.iter().filter(|c| c.round() == round).cloned().collect())
    }

    /// The cycle immediately after `(round, name)` in the ordered list.
    pub(crate) fn cycle_after(&self, round: u32, name: &str) -> Option<Arc<SelectionCycle>> {
        let cycles = self.cycles.read().ok()?;
        let idx = cycles.iter().position(|c| c.round() == round && c.name() == name)?;
        cycles.get(idx + 1).cloned()
    }

    /// The cycle immediately before `(round, name)` in the ordered list.
    pub(crate) fn cycle_before(&self, round: u32, name: &str) -> Option<Arc<SelectionCycle>> {
        let cycles = self.cycles.read().ok()?;
        let idx = cycles.iter().position(|c| c.round() == round && c.name() == name)?;
        idx.checked_sub(1).and_then(|i| cycles.get(i)).cloned()
    }

    /// Flush the pool and every cycle to disk, in dependency order (cycles
    /// first, since they reference pool ids; then the pool itself).
    pub fn flush(&self) -> Result<(), ExperimentError> {
        let cycles = self.cycles.read().map_err(|_| ExperimentError::LockPoisoned)?;
        for cycle in cycles.iter() {
            cycle.flush(&self.root)?;
        }
        self.pool.flush(&self.root)?;
        Ok(())
    }

    /// Flush and release every store handle, in reverse dependency order
    /// from how they were opened (spec.md §9).
    pub fn close(&self) -> Result<(), ExperimentError> {
        self.flush()?;
        info!(root = %self.root.display(), "experiment closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn cfg(round: u32, name: &str) -> CycleConfig {
        CycleConfig {
            round,
            name: name.to_string(),
            barcode5: None,
            barcode3: None,
            is_control: false,
            is_counter: false,
        }
    }

    #[test]
    fn cycles_are_ordered_by_round() {
        let dir = tempdir().unwrap();
        let experiment = Experiment::open(dir.path(), BloomConfig::default()).unwrap();

        let c3 = experiment.open_cycle(cfg(3, "R3")).unwrap();
        let c1 = experiment.open_cycle(cfg(1, "R1")).unwrap();
        let c2 = experiment.open_cycle(cfg(2, "R2")).unwrap();

        assert_eq!(c1.next_cycle().unwrap().round(), 2);
        assert_eq!(c2.next_cycle().unwrap().round(), 3);
        assert_eq!(c3.previous_cycle().unwrap().round(), 2);
        assert!(c3.next_cycle().is_none());
        assert!(c1.previous_cycle().is_none());
    }

    #[test]
    fn open_cycle_is_idempotent_by_round_and_name() {
        let dir = tempdir().unwrap();
        let experiment = Experiment::open(dir.path(), BloomConfig::default()).unwrap();
        let a = experiment.open_cycle(cfg(1, "R1")).unwrap();
        let b = experiment.open_cycle(cfg(1, "R1")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn end_to_end_register_and_count() {
        let dir = tempdir().unwrap();
        let experiment = Experiment::open(dir.path(), BloomConfig::default()).unwrap();
        let cycle = experiment.open_cycle(cfg(1, "R1")).unwrap();

        cycle.add(experiment.pool(), b"ACGTACGT", 0, 0).unwrap();
        cycle.add(experiment.pool(), b"ACGTACGT", 0, 0).unwrap();

        assert_eq!(cycle.size(), 2);
        assert_eq!(cycle.unique_size(), 1);
        assert_eq!(experiment.pool().size(), 1);

        experiment.close().unwrap();
    }
}
