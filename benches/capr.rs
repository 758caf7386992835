//! Micro-benchmarks for the CapR structural-context engine and its
//! parallel driver.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench capr
//! ```

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::Rng;

use selexdb::capr::{self, driver};
use selexdb::config::CapRConfig;
use selexdb::pool::AptamerPool;
use tempfile::TempDir;

fn random_sequence(len: usize) -> Vec<u8> {
    let bases = [b'A', b'C', b'G', b'U'];
    let mut rng = rand::rng();
    (0..len).map(|_| bases[rng.random_range(0..4)]).collect()
}

/// Benchmark group for [`capr::fold`] on sequences of increasing length.
///
/// ## `fold/{30,60,90}`
///
/// **Scenario:** Folds a single random sequence of the given length with
/// default span settings.
///
/// **What it measures:** The banded inside/outside partition-function
/// cost, which is quadratic in sequence length for a fixed `max_span`.
///
/// **Expected behaviour:** Growth should be closer to linear than
/// quadratic within the `max_span` band, then start bending upward once
/// sequence length exceeds a few multiples of `max_span`.
fn bench_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("fold");
    let config = CapRConfig::default();

    for &len in &[30usize, 60, 90] {
        let sequence = random_sequence(len);
        group.bench_function(BenchmarkId::new("length", len), |b| {
            b.iter(|| {
                let profile = capr::fold(black_box(&sequence), black_box(&config)).unwrap();
                black_box(&profile);
            });
        });
    }

    group.finish();
}

/// Benchmark group for the parallel pool-profiling driver.
///
/// ## `run/{100,500}`
///
/// **Scenario:** Registers N random 30-base aptamers into a fresh pool,
/// then profiles the whole pool once.
///
/// **What it measures:** End-to-end driver throughput: queueing, worker
/// fan-out, and per-aptamer folding cost together.
fn bench_driver(c: &mut Criterion) {
    let mut group = c.benchmark_group("driver");
    group.sample_size(10);
    let config = CapRConfig {
        queue_capacity: 64,
        max_threads: 4,
        ..CapRConfig::default()
    };

    for &count in &[100u64, 500] {
        group.bench_function(BenchmarkId::new("run", count), |b| {
            b.iter(|| {
                let dir = TempDir::new().unwrap();
                let pool = AptamerPool::open(dir.path(), 100_000, 0.01).unwrap();
                for _ in 0..count {
                    pool.register(&random_sequence(30), 0, 0).unwrap();
                }
                let mut profiles = driver::open_profile_store(dir.path()).unwrap();
                let summary = driver::run(&pool, &mut profiles, &config).unwrap();
                black_box(&summary);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fold, bench_driver);
criterion_main!(benches);
