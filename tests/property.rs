//! Property-based tests for the cross-cutting invariants of spec.md §8,
//! invariants 1–5 and 7 (invariant 6 — round-trip — and the S1–S6
//! end-to-end scenarios are covered by example-based tests alongside the
//! modules they exercise and in `tests/integration.rs`).

use proptest::prelude::*;
use tempfile::tempdir;

use selexdb::bloom::BloomIndex;
use selexdb::capr::{self, StructContext};
use selexdb::config::{BloomConfig, CapRConfig, CycleConfig};
use selexdb::cycle::SelectionCycle;
use selexdb::pool::AptamerPool;
use selexdb::stitch::{self, StitchConfig};

fn dna_sequence(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop_oneof![Just(b'A'), Just(b'C'), Just(b'G'), Just(b'T')], 1..=max_len)
}

fn rna_sequence(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop_oneof![Just(b'A'), Just(b'C'), Just(b'G'), Just(b'U')], 1..=max_len)
}

proptest! {
    /// Invariant 1: registering the same sequence twice always returns the
    /// same id, regardless of what else was registered in between.
    #[test]
    fn invariant1_register_is_idempotent(
        seq in dna_sequence(40),
        others in prop::collection::vec(dna_sequence(40), 0..10),
    ) {
        let dir = tempdir().unwrap();
        let pool = AptamerPool::open(dir.path(), 10_000, 0.01).unwrap();

        let first = pool.register(&seq, 0, 0).unwrap();
        for other in &others {
            pool.register(other, 0, 0).unwrap();
        }
        let second = pool.register(&seq, 0, 0).unwrap();

        prop_assert_eq!(first, second);
    }

    /// Invariant 2: the randomized-region bounds returned for any
    /// registered sequence always satisfy `start <= end <= length`.
    #[test]
    fn invariant2_bounds_stay_within_sequence_length(
        seq in dna_sequence(60),
        trim5 in 0u32..20,
        trim3 in 0u32..20,
    ) {
        let dir = tempdir().unwrap();
        let pool = AptamerPool::open(dir.path(), 10_000, 0.01).unwrap();

        let id = pool.register(&seq, trim5, trim3).unwrap();
        let bounds = pool.bounds_of(id).unwrap();

        prop_assert!(bounds.start <= bounds.end);
        prop_assert!(bounds.end <= seq.len() as u32);
    }

    /// Invariant 3: a cycle's total size always equals the sum of its
    /// per-id counts, and `unique_size` always equals the number of ids
    /// with a nonzero count.
    #[test]
    fn invariant3_cycle_size_equals_sum_of_counts(
        sequences in prop::collection::vec(dna_sequence(20), 1..30),
    ) {
        let dir = tempdir().unwrap();
        let pool = AptamerPool::open(dir.path(), 10_000, 0.01).unwrap();
        let cycle = SelectionCycle::open(
            dir.path(),
            CycleConfig {
                round: 0,
                name: "prop".into(),
                barcode5: None,
                barcode3: None,
                is_control: false,
                is_counter: false,
            },
            BloomConfig::default(),
            std::sync::Weak::new(),
        )
        .unwrap();

        let mut expected_counts: std::collections::HashMap<Vec<u8>, u32> = std::collections::HashMap::new();
        for seq in &sequences {
            cycle.add(&pool, seq, 0, 0).unwrap();
            *expected_counts.entry(seq.clone()).or_insert(0) += 1;
        }

        let expected_size: u64 = expected_counts.values().map(|&c| c as u64).sum();
        let expected_unique: u64 = expected_counts.len() as u64;

        prop_assert_eq!(cycle.size(), expected_size);
        prop_assert_eq!(cycle.unique_size(), expected_unique);

        for (seq, count) in &expected_counts {
            prop_assert_eq!(cycle.count_of(&pool, seq).unwrap(), *count);
        }
    }

    /// Invariant 4: once a key is added to a Bloom filter, it is reported
    /// present forever after (zero false negatives).
    #[test]
    fn invariant4_bloom_never_false_negatives(
        keys in prop::collection::vec(dna_sequence(30), 1..50),
    ) {
        let mut bloom = BloomIndex::new(1000, 0.01).unwrap();
        for key in &keys {
            bloom.add(key);
        }
        for key in &keys {
            prop_assert!(bloom.maybe_contains(key));
        }
    }

    /// Invariant 5: at every position of every folded sequence, the six
    /// structural-context probabilities sum to 1 within `1e-6`.
    #[test]
    fn invariant5_capr_probabilities_sum_to_one(seq in rna_sequence(25)) {
        let config = CapRConfig { queue_capacity: 8, max_threads: 2, ..CapRConfig::default() };
        let profile = capr::fold(&seq, &config).unwrap();

        for k in 0..profile.len() {
            let sum: f64 = profile.context_probs(k).iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-6, "position {} summed to {}", k, sum);
            for context in [
                StructContext::Bulge,
                StructContext::External,
                StructContext::Hairpin,
                StructContext::Interior,
                StructContext::Multiloop,
                StructContext::Stem,
            ] {
                let p = profile.probability(k, context);
                prop_assert!((0.0..=1.0).contains(&p), "position {} context {:?} out of range: {}", k, context, p);
            }
        }
    }

    /// Invariant 7: stitching a forward read against a mismatch-free
    /// reverse-complement of itself, truncated to a shared overlap,
    /// reconstructs the forward read.
    #[test]
    fn invariant7_reverse_complement_overlap_reconstructs_forward(
        seq in dna_sequence(40),
        overlap in 6usize..20,
    ) {
        prop_assume!(seq.len() >= overlap);
        let qualities = vec![b'I'; seq.len()];
        let rc = stitch::reverse_complement(&seq);
        let overlap = overlap.min(seq.len());
        let reverse = rc[..overlap].to_vec();
        let reverse_qualities = vec![b'I'; reverse.len()];

        let config = StitchConfig { min_overlap: overlap, max_mismatch_rate: 0.0 };
        let stitched = stitch::stitch(&seq, &qualities, &reverse, &reverse_qualities, &config).unwrap();

        prop_assert_eq!(stitched.bases, seq);
    }
}
