//! Parallel CapR driver: folds every aptamer in a pool across a bounded
//! queue of worker threads (spec.md §4.10), mirroring the 1-producer /
//! N-consumer layout of [`crate::aptaplex`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel;
use tracing::debug;

use std::path::Path;

use crate::capr::engine::{self, CapRError, Profile};
use crate::config::CapRConfig;
use crate::directory;
use crate::errors::SelexError;
use crate::pool::AptamerPool;
use crate::store::{Store, StoreError};

enum Message {
    Work(u32, Vec<u8>),
    Poison,
}

/// Open (or create) the structural-profile store rooted at `root`,
/// creating `structuredata/` lazily since it's only needed when CapR
/// profiling is actually run (spec.md §6).
pub fn open_profile_store(root: &Path) -> Result<Store, StoreError> {
    let dir = root.join(directory::PROFILE_DIR);
    std::fs::create_dir_all(&dir)?;
    Store::open(dir.join(directory::ID_TO_PROFILE_FILE))
}

/// Summary of a completed profiling run over a pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProfileRunSummary {
    /// Aptamers successfully folded and stored.
    pub profiled: u64,
    /// Aptamers that failed to fold (e.g. invalid bases) and were skipped.
    pub failed: u64,
}

/// Fold every aptamer currently registered in `pool`, writing each
/// resulting [`Profile`] into `profiles` (keyed by aptamer id, little-endian
/// `u32` key, packed `f64` profile bytes as the value).
///
/// Aptamers already present in `profiles` are skipped, so re-running after
/// the pool has grown only profiles the new entries.
pub fn run(
    pool: &AptamerPool,
    profiles: &mut Store,
    config: &CapRConfig,
) -> Result<ProfileRunSummary, SelexError> {
    let (tx, rx) = channel::bounded::<Message>(config.queue_capacity.max(1));
    let n = std::cmp::min(num_cpus::get(), config.max_threads.max(1)).max(1);
    let worker_count = n.saturating_sub(1).max(1);

    let profiled = Arc::new(AtomicU64::new(0));
    let failed = Arc::new(AtomicU64::new(0));
    let results: Arc<std::sync::Mutex<Vec<(u32, Profile)>>> = Arc::new(std::sync::Mutex::new(Vec::new()));

    let mut consumers = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let rx = rx.clone();
        let tx = tx.clone();
        let config = *config;
        let profiled = Arc::clone(&profiled);
        let failed = Arc::clone(&failed);
        let results = Arc::clone(&results);

        consumers.push(thread::spawn(move || -> Result<(), String> {
            loop {
                match rx.recv() {
                    Ok(Message::Work(id, sequence)) => match engine::fold(&sequence, &config) {
                        Ok(profile) => {
                            profiled.fetch_add(1, Ordering::Relaxed);
                            results.lock().map_err(|e| e.to_string())?.push((id, profile));
                        }
                        Err(CapRError::InvalidBase(..) | CapRError::EmptySequence) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    Ok(Message::Poison) => {
                        let _ = tx.send(Message::Poison);
                        break;
                    }
                    Err(_) => break,
                }
            }
            Ok(())
        }));
    }
    drop(rx);

    let existing: Vec<(Vec<u8>, u32)> = pool.iter().map_err(SelexError::from)?;

    for (sequence, id) in existing {
        if profiles.contains(&id.to_le_bytes()) {
            continue;
        }
        if tx.send(Message::Work(id, sequence)).is_err() {
            break;
        }
    }
    let _ = tx.send(Message::Poison);
    drop(tx);

    for handle in consumers {
        handle
            .join()
            .map_err(|e| SelexError::Internal(format!("capr worker panicked: {e:?}")))?
            .map_err(SelexError::Internal)?;
    }

    let pending = Arc::try_unwrap(results)
        .map_err(|_| SelexError::Internal("capr result handles still shared".into()))?
        .into_inner()
        .map_err(|e| SelexError::Internal(e.to_string()))?;

    for (id, profile) in pending {
        profiles.put(&id.to_le_bytes(), &profile.to_packed_bytes());
    }

    debug!(
        profiled = profiled.load(Ordering::Relaxed),
        failed = failed.load(Ordering::Relaxed),
        "capr profiling run complete"
    );

    Ok(ProfileRunSummary {
        profiled: profiled.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BloomConfig;
    use tempfile::tempdir;

    #[test]
    fn profiles_every_registered_aptamer() {
        let dir = tempdir().unwrap();
        let bloom = BloomConfig::default();
        let pool = AptamerPool::open(dir.path(), bloom.capacity, bloom.fp_rate).unwrap();
        pool.register(b"GGGAAAUCCC", 0, 0).unwrap();
        pool.register(b"ACGTACGTAC", 0, 0).unwrap();

        let mut profiles = open_profile_store(dir.path()).unwrap();
        let config = CapRConfig {
            temperature: 37.0,
            max_span: 30,
            queue_capacity: 16,
            max_threads: 2,
        };
        let summary = run(&pool, &mut profiles, &config).unwrap();
        assert_eq!(summary.profiled, 2);
        assert_eq!(summary.failed, 0);
        assert!(profiles.contains(&0u32.to_le_bytes()));
        assert!(profiles.contains(&1u32.to_le_bytes()));
    }

    #[test]
    fn skips_already_profiled_aptamers() {
        let dir = tempdir().unwrap();
        let bloom = BloomConfig::default();
        let pool = AptamerPool::open(dir.path(), bloom.capacity, bloom.fp_rate).unwrap();
        pool.register(b"GGGAAAUCCC", 0, 0).unwrap();

        let mut profiles = open_profile_store(dir.path()).unwrap();
        let config = CapRConfig {
            temperature: 37.0,
            max_span: 30,
            queue_capacity: 16,
            max_threads: 2,
        };
        run(&pool, &mut profiles, &config).unwrap();
        let summary = run(&pool, &mut profiles, &config).unwrap();
        assert_eq!(summary.profiled, 0);
    }
}
