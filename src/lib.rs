//! # selexdb
//!
//! A persistent, batch-oriented aptamer sequencing toolkit for SELEX
//! experiments: a content-addressed aptamer pool, per-round selection
//! cycles, a parallel AptaPlex-style demultiplexing pipeline, and a CapR
//! secondary-structure context profiler.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        Experiment                         │
//! │  ┌──────────────┐   ┌────────────────────────────────┐    │
//! │  │ AptamerPool   │   │  SelectionCycle (per round)     │    │
//! │  │ seq <-> id    │◄──┤  id -> count, Bloom, next/prev   │    │
//! │  │ id -> bounds  │   └────────────────────────────────┘    │
//! │  └──────┬───────┘                                          │
//! │         │ register()                                      │
//! │  ┌──────┴────────────────────────────────────────────┐     │
//! │  │  AptaPlex: reader -> stitch -> match -> register   │     │
//! │  │  (1 producer / N-1 consumer threads)               │     │
//! │  └─────────────────────────────────────────────────────┘    │
//! │                                                             │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │  CapR: per-aptamer structural-context profiling      │   │
//! │  │  (banded inside/outside partition function)          │   │
//! │  └───────────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`store`] | Persistent, mmap-backed, CRC-checked key-value store |
//! | [`bloom`] | Bloom-filter membership index wrapper |
//! | [`pool`] | Sequence↔id aptamer pool with randomized-region bounds |
//! | [`cycle`] | Per-round selection cycle: id→count, Bloom, round navigation |
//! | [`experiment`] | Owns the pool and an experiment's ordered cycles |
//! | [`read`] | A single- or paired-end read in flight through the pipeline |
//! | [`reader`] | FASTQ/FASTA readers with transparent gzip detection |
//! | [`stitch`] | Paired-end overlap stitching and consensus |
//! | [`matcher`] | Primer/barcode anchoring and demultiplexing |
//! | [`aptaplex`] | The parallel demultiplexing driver |
//! | [`capr`] | RNA/DNA secondary-structure context profiling |
//! | [`config`] | Injected configuration structs |
//! | [`directory`] | On-disk project layout constants |
//! | [`encoding`] | Shared byte/integer encoding helpers |
//! | [`errors`] | Crate-wide error composition |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use selexdb::config::{BloomConfig, CycleConfig};
//! use selexdb::experiment::Experiment;
//!
//! let experiment = Experiment::open("/tmp/my-experiment", BloomConfig::default()).unwrap();
//! let cycle = experiment.open_cycle(CycleConfig {
//!     round: 0,
//!     name: "library".into(),
//!     barcode5: None,
//!     barcode3: None,
//!     is_control: false,
//!     is_counter: false,
//! }).unwrap();
//!
//! cycle.add(experiment.pool(), b"ACGTACGTACGT", 0, 0).unwrap();
//! assert_eq!(cycle.size(), 1);
//!
//! experiment.close().unwrap();
//! ```

#![allow(dead_code)]

pub mod aptaplex;
pub mod bloom;
pub mod capr;
pub mod config;
pub mod cycle;
pub mod directory;
pub mod encoding;
pub mod errors;
pub mod experiment;
pub mod matcher;
pub mod pool;
pub mod read;
pub mod reader;
pub mod stitch;
pub mod store;

pub use errors::SelexError;
