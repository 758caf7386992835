//! On-disk project layout constants and bootstrap helpers.
//!
//! Mirrors the teacher's `engine::{MANIFEST_DIR, MEMTABLE_DIR, SSTABLE_DIR}`
//! constants and `Engine::open`'s directory bootstrap, but for the layout
//! spec.md §6 mandates: `pooldata/`, `cycledata/`, and an optional
//! `structuredata/`.

use std::fs;
use std::path::{Path, PathBuf};

/// Directory (relative to the project root) holding the pool's stores and
/// Bloom filter.
pub const POOL_DIR: &str = "pooldata";

/// Directory (relative to the project root) holding one store + Bloom
/// filter pair per selection cycle.
pub const CYCLE_DIR: &str = "cycledata";

/// Directory (relative to the project root) holding the optional
/// structural-profile store.
pub const PROFILE_DIR: &str = "structuredata";

/// File name of the pool's sequence→id store, under [`POOL_DIR`].
pub const SEQ_TO_ID_FILE: &str = "seq_to_id.store";

/// File name of the pool's id→bounds store, under [`POOL_DIR`].
pub const ID_TO_BOUNDS_FILE: &str = "id_to_bounds.store";

/// File name of the pool's sequence Bloom filter, under [`POOL_DIR`].
pub const POOL_BLOOM_FILE: &str = "pool_bloom.bin";

/// File name of the structural-profile store, under [`PROFILE_DIR`].
pub const ID_TO_PROFILE_FILE: &str = "id_to_profile.store";

/// Create `root`, `root/pooldata`, and `root/cycledata` if they don't
/// already exist. `structuredata` is created lazily, only when a profile
/// store is actually opened.
pub fn create_dirs_if_missing(root: &Path) -> std::io::Result<()> {
    fs::create_dir_all(root.join(POOL_DIR))?;
    fs::create_dir_all(root.join(CYCLE_DIR))?;
    Ok(())
}

/// Path to the store file for a given cycle round + name, e.g.
/// `cycledata/3_counter.store`.
pub fn cycle_store_path(root: &Path, round: u32, name: &str) -> PathBuf {
    root.join(CYCLE_DIR).join(format!("{round}_{name}.store"))
}

/// Path to the Bloom filter file for a given cycle round + name, e.g.
/// `cycledata/3_counter.bloom`.
pub fn cycle_bloom_path(root: &Path, round: u32, name: &str) -> PathBuf {
    root.join(CYCLE_DIR).join(format!("{round}_{name}.bloom"))
}
