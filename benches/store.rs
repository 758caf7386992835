//! Micro-benchmarks for the persistent store and the aptamer pool built on
//! top of it.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench store
//! ```

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use selexdb::config::BloomConfig;
use selexdb::pool::AptamerPool;
use selexdb::store::Store;
use tempfile::TempDir;

fn make_sequence(i: u64, len: usize) -> Vec<u8> {
    let bases = [b'A', b'C', b'G', b'T'];
    (0..len).map(|k| bases[((i as usize + k) % 4)]).collect()
}

/// Benchmark group for [`Store`] put/get throughput.
///
/// ## `put/memory` and `get/memory`
///
/// **Scenario:** Inserts (or looks up) sequential keys, never flushing, so
/// every operation hits the in-memory pending buffer.
///
/// **What it measures:** Raw `BTreeMap` insert/lookup cost — the floor for
/// every store operation before a flush touches disk.
///
/// ## `get/after_flush`
///
/// **Scenario:** Pre-populates 10,000 keys, flushes once, then looks up
/// random existing keys.
///
/// **What it measures:** The mmap-backed snapshot read path: index lookup
/// plus a CRC-checked slice of the memory map.
fn bench_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");

    group.bench_function("put/memory", |b| {
        let dir = TempDir::new().unwrap();
        let mut store = Store::open(dir.path().join("bench.store")).unwrap();
        let mut seq = 0u64;
        b.iter(|| {
            let key = make_sequence(seq, 24);
            store.put(black_box(&key), black_box(&seq.to_le_bytes()));
            seq += 1;
        });
    });

    group.bench_function("get/memory", |b| {
        let dir = TempDir::new().unwrap();
        let mut store = Store::open(dir.path().join("bench.store")).unwrap();
        let n = 10_000u64;
        for i in 0..n {
            store.put(&make_sequence(i, 24), &i.to_le_bytes());
        }
        let mut i = 0u64;
        b.iter(|| {
            let key = make_sequence(i % n, 24);
            let _ = black_box(store.get(black_box(&key)));
            i += 1;
        });
    });

    group.bench_function("get/after_flush", |b| {
        let dir = TempDir::new().unwrap();
        let mut store = Store::open(dir.path().join("bench.store")).unwrap();
        let n = 10_000u64;
        for i in 0..n {
            store.put(&make_sequence(i, 24), &i.to_le_bytes());
        }
        store.flush().unwrap();
        let mut i = 0u64;
        b.iter(|| {
            let key = make_sequence(i % n, 24);
            let _ = black_box(store.get(black_box(&key)));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark group for [`AptamerPool::register`].
///
/// ## `register/new` and `register/duplicate`
///
/// **Scenario:** Registers a stream of sequences, either all distinct or
/// all the same handful repeated.
///
/// **What it measures:** `register`'s double-checked-locking discipline:
/// the Bloom-filter fast path for duplicates versus the full write-lock
/// path for first sight of a sequence.
fn bench_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool");

    group.bench_function("register/new", |b| {
        b.iter_batched(
            || TempDir::new().unwrap(),
            |dir| {
                let pool = AptamerPool::open(dir.path(), 100_000, 0.01).unwrap();
                for i in 0..1_000u64 {
                    pool.register(black_box(&make_sequence(i, 30)), 0, 0).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("register/duplicate", |b| {
        let dir = TempDir::new().unwrap();
        let pool = AptamerPool::open(dir.path(), 100_000, 0.01).unwrap();
        let sequence = make_sequence(0, 30);
        pool.register(&sequence, 0, 0).unwrap();
        b.iter(|| {
            let _ = black_box(pool.register(black_box(&sequence), 0, 0).unwrap());
        });
    });

    group.bench_function("register/id", |b| {
        let dir = TempDir::new().unwrap();
        let pool = AptamerPool::open(dir.path(), 100_000, 0.01).unwrap();
        let n = 5_000u64;
        for i in 0..n {
            pool.register(&make_sequence(i, 30), 0, 0).unwrap();
        }
        let mut i = 0u64;
        b.iter(|| {
            let sequence = make_sequence(i % n, 30);
            let _ = black_box(pool.identifier_of(black_box(&sequence)).unwrap());
            i += 1;
        });
    });

    group.bench_function("reopen", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let pool = AptamerPool::open(dir.path(), 100_000, 0.01).unwrap();
                for i in 0..5_000u64 {
                    pool.register(&make_sequence(i, 30), 0, 0).unwrap();
                }
                pool.close(dir.path()).unwrap();
                dir
            },
            |dir| {
                let pool = AptamerPool::open(dir.path(), 100_000, 0.01).unwrap();
                black_box(pool.size());
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_store, bench_pool);
criterion_main!(benches);
