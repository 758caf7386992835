//! Persistent key-value store (spec.md §4.1).
//!
//! A single-writer, many-reader ordered map from byte-string keys to
//! byte-string values, backed by a memory-mapped, immutable, on-disk
//! snapshot plus an in-memory write buffer for records not yet flushed.
//!
//! Unlike the teacher's `sstable`/`memtable`/`wal` trio — which exist to
//! support multi-version concurrency, compaction, and crash-safe replay for
//! a general-purpose LSM engine — this store has none of that machinery,
//! because spec.md §1 scopes it as "a batch-oriented index, not a
//! database": ids are dense and monotonic, bounds and counts are
//! write-once-or-monotonically-increasing, and a crash mid-parse is
//! expected to leave the store at its last flush (callers re-parse). What
//! *is* kept from the teacher is the texture: mmap-backed immutable
//! snapshots, length-prefixed CRC32-checked records, and atomic
//! write-to-temp-then-rename publication.
//!
//! # On-disk layout
//!
//! ```text
//! [MAGIC 4][VERSION u32][HEADER_CRC u32]
//! [KEY_LEN u32][KEY bytes][VALUE_LEN u32][VALUE bytes][REC_CRC u32]
//! [KEY_LEN u32][KEY bytes][VALUE_LEN u32][VALUE bytes][REC_CRC u32]
//! ...
//! ```
//!
//! Records are stored in ascending key order; [`Store::flush`] rewrites the
//! whole snapshot from pending writes merged with the previous snapshot, so
//! the file is always fully sorted and can be scanned directly for
//! [`Store::range_iter`].


use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crc32fast::Hasher as Crc32;
use memmap2::Mmap;
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::encoding::{Decode, Encode, EncodingError};

const STORE_MAGIC: [u8; 4] = *b"SXS0";
const STORE_VERSION: u32 = 1;
const HEADER_SIZE: usize = 4 + 4 + 4; // magic + version + header_crc
const REC_CRC_SIZE: usize = 4;

/// Errors returned by [`Store`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The on-disk file's magic bytes or version did not match what this
    /// store expects.
    #[error("corrupt store header at {0}")]
    CorruptHeader(String),

    /// A record's checksum did not match its stored bytes.
    #[error("checksum mismatch in store file (offset {0})")]
    ChecksumMismatch(u64),

    /// The file was truncated mid-record.
    #[error("truncated store file")]
    Truncated,

    /// A key or value could not be framed through the shared wire format.
    #[error("record encoding error: {0}")]
    Encoding(#[from] EncodingError),
}

/// A single on-disk record: `[key_len][key][value_len][value][crc32]`,
/// where the length-prefixed key and value are framed via the shared
/// [`crate::encoding`] `Encode`/`Decode` impls for `&[u8]`/`Vec<u8>`.
struct Record<'a> {
    key: &'a [u8],
    value: &'a [u8],
}

impl Record<'_> {
    fn write_to(&self, out: &mut Vec<u8>) -> Result<(), StoreError> {
        let start = out.len();
        self.key.encode_to(out)?;
        self.value.encode_to(out)?;

        let mut crc = Crc32::new();
        crc.update(&out[start..]);
        crc.finalize().encode_to(out)?;
        Ok(())
    }
}

/// One entry in the immutable snapshot's in-memory index: byte offset and
/// length of the value within the mmap.
#[derive(Clone, Copy)]
struct IndexEntry {
    value_offset: usize,
    value_len: usize,
}

/// The immutable, memory-mapped on-disk snapshot.
struct Snapshot {
    mmap: Mmap,
    index: BTreeMap<Vec<u8>, IndexEntry>,
}

impl Snapshot {
    /// Open and fully index an existing snapshot file.
    ///
    /// # Safety
    ///
    /// Uses `unsafe { Mmap::map(...) }`, safe in practice because the file
    /// is never mutated after this point (the store always writes a fresh
    /// file on flush and atomically renames it into place) and every
    /// offset used below is bounds-checked against `mmap.len()` before
    /// slicing.
    fn open(path: &Path) -> Result<Option<Self>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(None);
        }
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < HEADER_SIZE {
            return Err(StoreError::Truncated);
        }
        let (magic, _) = <[u8; 4]>::decode_from(&mmap[0..])
            .map_err(|_| StoreError::Truncated)?;
        if magic != STORE_MAGIC {
            return Err(StoreError::CorruptHeader("bad magic".into()));
        }
        let (version, _) =
            u32::decode_from(&mmap[4..]).map_err(|_| StoreError::Truncated)?;
        if version != STORE_VERSION {
            return Err(StoreError::CorruptHeader(format!(
                "unsupported version {version}"
            )));
        }
        let mut hdr_crc = Crc32::new();
        hdr_crc.update(&mmap[0..8]);
        let (expected, _) =
            u32::decode_from(&mmap[8..]).map_err(|_| StoreError::Truncated)?;
        if hdr_crc.finalize() != expected {
            return Err(StoreError::CorruptHeader("header checksum mismatch".into()));
        }

        let mut index = BTreeMap::new();
        let mut offset = HEADER_SIZE;
        while offset < mmap.len() {
            let rec_start = offset;

            let (key, key_consumed) = Vec::<u8>::decode_from(&mmap[offset..])
                .map_err(|_| StoreError::Truncated)?;
            offset += key_consumed;

            let (value_len, len_consumed) =
                u32::decode_from(&mmap[offset..]).map_err(|_| StoreError::Truncated)?;
            offset += len_consumed;
            let value_len = value_len as usize;
            let value_offset = offset;
            if offset + value_len + REC_CRC_SIZE > mmap.len() {
                return Err(StoreError::Truncated);
            }
            offset += value_len;

            let mut crc = Crc32::new();
            crc.update(&mmap[rec_start..offset]);
            let (stored_crc, _) =
                u32::decode_from(&mmap[offset..]).map_err(|_| StoreError::Truncated)?;
            if crc.finalize() != stored_crc {
                return Err(StoreError::ChecksumMismatch(rec_start as u64));
            }
            offset += REC_CRC_SIZE;

            index.insert(
                key,
                IndexEntry {
                    value_offset,
                    value_len,
                },
            );
        }

        Ok(Some(Self { mmap, index }))
    }

    fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let entry = self.index.get(key)?;
        Some(&self.mmap[entry.value_offset..entry.value_offset + entry.value_len])
    }

    fn contains(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }
}

/// A file-backed, memory-mapped ordered map from byte keys to byte values.
///
/// Writes accumulate in an in-memory buffer; `flush()` merges the buffer
/// with the previous snapshot into a fresh file and re-opens it read-only
/// via `mmap`. `Store` is not internally synchronized — callers needing
/// concurrent access (the pool, a selection cycle) wrap it in a lock, per
/// spec.md §5's shared-resource policy.
pub struct Store {
    path: PathBuf,
    snapshot: Option<Snapshot>,
    pending: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Count of distinct logical keys across `snapshot` and `pending`.
    len: usize,
}

impl Store {
    /// Open the store at `path`, creating an empty one if the file does
    /// not yet exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = Snapshot::open(&path)?;
        let len = snapshot.as_ref().map_or(0, |s| s.index.len());
        debug!(path = %path.display(), len, "store opened");
        Ok(Self {
            path,
            snapshot,
            pending: BTreeMap::new(),
            len,
        })
    }

    /// Insert or overwrite `key` with `value`. Buffered until the next
    /// [`Store::flush`].
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        let is_new = !self.pending.contains_key(key)
            && !self.snapshot.as_ref().is_some_and(|s| s.contains(key));
        self.pending.insert(key.to_vec(), value.to_vec());
        if is_new {
            self.len += 1;
        }
    }

    /// Look up `key`, checking the pending write buffer first, then the
    /// on-disk snapshot.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        if let Some(value) = self.pending.get(key) {
            return Some(value.clone());
        }
        self.snapshot.as_ref().and_then(|s| s.get(key)).map(|v| v.to_vec())
    }

    /// Test for presence without copying the value.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.pending.contains_key(key) || self.snapshot.as_ref().is_some_and(|s| s.contains(key))
    }

    /// Iterate all entries in ascending key order, pending writes shadowing
    /// the on-disk snapshot.
    pub fn range_iter(&self) -> impl Iterator<Item = (Vec<u8>, Vec<u8>)> + '_ {
        let snapshot_keys: Box<dyn Iterator<Item = Vec<u8>>> = match &self.snapshot {
            Some(s) => Box::new(s.index.keys().cloned()),
            None => Box::new(std::iter::empty()),
        };
        let mut all_keys: Vec<Vec<u8>> = snapshot_keys.chain(self.pending.keys().cloned()).collect();
        all_keys.sort();
        all_keys.dedup();
        all_keys.into_iter().map(move |k| {
            let v = self.get(&k).unwrap_or_default();
            (k, v)
        })
    }

    /// Number of distinct keys currently stored (pending + flushed).
    pub fn size(&self) -> usize {
        self.len
    }

    /// Merge the pending write buffer with the current snapshot into a
    /// fresh file, written atomically via a temporary path and rename.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.pending.is_empty() && self.snapshot.is_some() {
            return Ok(());
        }

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        if let Some(snapshot) = &self.snapshot {
            for key in snapshot.index.keys() {
                if let Some(value) = snapshot.get(key) {
                    merged.insert(key.clone(), value.to_vec());
                }
            }
        }
        for (key, value) in &self.pending {
            merged.insert(key.clone(), value.clone());
        }

        let mut buf = Vec::new();
        STORE_MAGIC.encode_to(&mut buf)?;
        STORE_VERSION.encode_to(&mut buf)?;
        let mut hdr_crc = Crc32::new();
        hdr_crc.update(&buf);
        hdr_crc.finalize().encode_to(&mut buf)?;

        for (key, value) in &merged {
            Record { key, value }.write_to(&mut buf)?;
        }

        let tmp_path = self.path.with_extension("store.tmp");
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(&buf)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, &self.path)?;

        self.snapshot = Snapshot::open(&self.path)?;
        self.pending.clear();
        self.len = merged.len();

        info!(path = %self.path.display(), len = self.len, "store flushed");
        Ok(())
    }

    /// Flush, then release the memory mapping.
    pub fn close(mut self) -> Result<(), StoreError> {
        self.flush()?;
        trace!(path = %self.path.display(), "store closed");
        Ok(())
    }
}
