//! Crate-wide error composition.
//!
//! Each subsystem (`store`, `pool`, `cycle`, `reader`, `stitch`, `matcher`,
//! `aptaplex`, `capr`) defines its own `thiserror` error enum. [`SelexError`]
//! composes them at the crate boundary the same way `EngineError` in the
//! teacher this crate grew from composes `ManifestError`/`MemtableError`/
//! `SSTableError` — one `#[from]` variant per subsystem, nothing else.

use thiserror::Error;

use crate::aptaplex::AptaplexError;
use crate::capr::CapRError;
use crate::cycle::CycleError;
use crate::matcher::MatchError;
use crate::pool::PoolError;
use crate::reader::ReaderError;
use crate::stitch::StitchError;
use crate::store::StoreError;

/// Top-level error type returned by public, crate-boundary operations.
#[derive(Debug, Error)]
pub enum SelexError {
    /// Error originating from the persistent key-value store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error originating from the aptamer pool.
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    /// Error originating from a selection cycle.
    #[error("cycle error: {0}")]
    Cycle(#[from] CycleError),

    /// Error originating from a FASTQ/FASTA reader.
    #[error("reader error: {0}")]
    Reader(#[from] ReaderError),

    /// Error originating from the paired-end stitcher.
    #[error("stitch error: {0}")]
    Stitch(#[from] StitchError),

    /// Error originating from the primer/barcode matcher.
    #[error("match error: {0}")]
    Match(#[from] MatchError),

    /// Error originating from the AptaPlex driver.
    #[error("aptaplex error: {0}")]
    Aptaplex(#[from] AptaplexError),

    /// Error originating from the CapR engine or its driver.
    #[error("capr error: {0}")]
    CapR(#[from] CapRError),

    /// Underlying filesystem I/O error not already wrapped by a subsystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal invariant violation (poisoned lock, unexpected state, etc.).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Reasons a single read can be rejected by the AptaPlex pipeline.
///
/// Maps directly onto the skip-and-count error kinds of spec.md §7; each
/// variant is one key of the [`crate::aptaplex::RejectionHistogram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RejectionReason {
    /// The record's sequence/quality line lengths disagreed, or the file
    /// layout otherwise violated the FASTQ/FASTA grammar.
    RecordMalformed,
    /// No overlap between forward and reverse reads met `min_overlap` /
    /// `max_mismatch_rate`.
    OverlapFailed,
    /// Neither the 5' nor the 3' primer could be anchored within tolerance.
    PrimerUnmatched,
    /// No configured cycle's barcodes matched the read's flanks.
    BarcodeUnmatched,
    /// More than one cycle's barcodes matched the read's flanks.
    BarcodeCollision,
    /// Mean phred quality in the randomized region fell below the threshold.
    QualityTooLow,
}

impl RejectionReason {
    /// All variants, in a stable order — used to seed histogram tables.
    pub const ALL: [RejectionReason; 6] = [
        RejectionReason::RecordMalformed,
        RejectionReason::OverlapFailed,
        RejectionReason::PrimerUnmatched,
        RejectionReason::BarcodeUnmatched,
        RejectionReason::BarcodeCollision,
        RejectionReason::QualityTooLow,
    ];
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectionReason::RecordMalformed => "record_malformed",
            RejectionReason::OverlapFailed => "overlap_failed",
            RejectionReason::PrimerUnmatched => "primer_unmatched",
            RejectionReason::BarcodeUnmatched => "barcode_unmatched",
            RejectionReason::BarcodeCollision => "barcode_collision",
            RejectionReason::QualityTooLow => "quality_too_low",
        };
        f.write_str(s)
    }
}
