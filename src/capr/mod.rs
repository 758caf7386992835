//! CapR: RNA/DNA secondary-structure context profiling (spec.md §4.9–§4.10).
//!
//! [`engine`] computes a per-base six-context probability profile for a
//! single sequence; [`driver`] fans that out over every aptamer in a pool
//! using the same bounded-queue worker layout as [`crate::aptaplex`].
//! [`tables`] holds the thermodynamic constants the engine folds with.

pub mod driver;
pub mod engine;
pub mod tables;

pub use engine::{fold, CapRError, Profile, StructContext};
pub use driver::{run, open_profile_store, ProfileRunSummary};
