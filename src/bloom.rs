//! Bloom filter wrapper used as a fast-reject gate in front of store
//! lookups (spec.md §4.2).
//!
//! Wraps the `bloomfilter` crate the same way `sstable::SSTableBloomBlock`
//! does: sized at construction from `(capacity, fp_rate)`, serialized as a
//! flat byte blob, framed with a CRC32 checksum on disk.

use std::fs;
use std::path::Path;

use bloomfilter::Bloom;
use crc32fast::Hasher as Crc32;
use thiserror::Error;

/// Errors returned by [`BloomIndex`] persistence operations.
#[derive(Debug, Error)]
pub enum BloomError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The filter could not be constructed for the requested capacity /
    /// false-positive rate.
    #[error("invalid bloom filter parameters: {0}")]
    InvalidParameters(String),

    /// On-disk checksum did not match the stored payload.
    #[error("checksum mismatch reading bloom filter")]
    ChecksumMismatch,

    /// Stored bytes were too short to contain a checksum trailer.
    #[error("truncated bloom filter file")]
    Truncated,

    /// The stored bytes did not parse as a bloom filter.
    #[error("corrupt bloom filter bytes: {0}")]
    Corrupt(String),
}

/// A probabilistic membership test over arbitrary byte keys.
///
/// Guarantees zero false negatives: `add(x)` followed by `maybe_contains(x)`
/// always returns `true`. False positives occur at a rate bounded by
/// `fp_rate` as long as the live element count stays at or below `capacity`.
pub struct BloomIndex {
    inner: Bloom<Vec<u8>>,
}

impl BloomIndex {
    /// Construct a new, empty filter sized for `capacity` expected items at
    /// `fp_rate` false-positive rate.
    pub fn new(capacity: usize, fp_rate: f64) -> Result<Self, BloomError> {
        let inner = Bloom::new_for_fp_rate(capacity.max(1), fp_rate)
            .map_err(|e| BloomError::InvalidParameters(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Record `key` as present. Idempotent.
    pub fn add(&mut self, key: &[u8]) {
        self.inner.set(&key.to_vec());
    }

    /// Test whether `key` might be present.
    ///
    /// `false` is a definitive answer ("never seen"); `true` means "seen,
    /// or a false positive" and must be confirmed against the backing
    /// store.
    pub fn maybe_contains(&self, key: &[u8]) -> bool {
        self.inner.check(&key.to_vec())
    }

    /// Serialize the filter to `path`, framed as `[bytes][crc32_le]`.
    pub fn save(&self, path: &Path) -> Result<(), BloomError> {
        let data = self.inner.as_slice().to_vec();
        let mut crc = Crc32::new();
        crc.update(&data);
        let checksum = crc.finalize();

        let mut out = Vec::with_capacity(data.len() + 4);
        out.extend_from_slice(&data);
        out.extend_from_slice(&checksum.to_le_bytes());
        fs::write(path, out)?;
        Ok(())
    }

    /// Load a filter previously written by [`BloomIndex::save`].
    pub fn load(path: &Path) -> Result<Self, BloomError> {
        let raw = fs::read(path)?;
        if raw.len() < 4 {
            return Err(BloomError::Truncated);
        }
        let (data, checksum_bytes) = raw.split_at(raw.len() - 4);
        let mut crc = Crc32::new();
        crc.update(data);
        let expected = u32::from_le_bytes([
            checksum_bytes[0],
            checksum_bytes[1],
            checksum_bytes[2],
            checksum_bytes[3],
        ]);
        if crc.finalize() != expected {
            return Err(BloomError::ChecksumMismatch);
        }

        let inner = Bloom::from_slice(data).map_err(|e| BloomError::Corrupt(e.to_string()))?;
        Ok(Self { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn add_then_maybe_contains_is_always_true() {
        let mut bloom = BloomIndex::new(1000, 0.01).unwrap();
        bloom.add(b"ACGTACGT");
        assert!(bloom.maybe_contains(b"ACGTACGT"));
    }

    #[test]
    fn absent_key_usually_reports_absent() {
        let bloom = BloomIndex::new(1000, 0.001).unwrap();
        assert!(!bloom.maybe_contains(b"NEVER_ADDED"));
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bloom");

        let mut bloom = BloomIndex::new(1000, 0.01).unwrap();
        bloom.add(b"ACGT");
        bloom.add(b"TTTT");
        bloom.save(&path).unwrap();

        let reloaded = BloomIndex::load(&path).unwrap();
        assert!(reloaded.maybe_contains(b"ACGT"));
        assert!(reloaded.maybe_contains(b"TTTT"));
    }

    #[test]
    fn detects_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bloom");

        let bloom = BloomIndex::new(100, 0.01).unwrap();
        bloom.save(&path).unwrap();

        let mut raw = fs::read(&path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        fs::write(&path, raw).unwrap();

        assert!(matches!(
            BloomIndex::load(&path),
            Err(BloomError::ChecksumMismatch)
        ));
    }
}
