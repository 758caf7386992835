//! The AptaPlex demultiplexing driver: 1 producer + N consumers over a
//! bounded queue (spec.md §4.8).

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use thiserror::Error;
use tracing::debug;

use crate::config::ParseConfig;
use crate::errors::RejectionReason;
use crate::experiment::{Experiment, ExperimentError};
use crate::matcher::{self, MatchError};
use crate::pool::PoolError;
use crate::reader::{self, ReaderError};
use crate::stitch::{self, StitchConfig, StitchError};

/// Errors returned by the driver itself (not per-read rejections, which are
/// aggregated into a [`RejectionHistogram`] instead).
#[derive(Debug, Error)]
pub enum AptaplexError {
    /// Error opening or reading an input file.
    #[error("reader error: {0}")]
    Reader(#[from] ReaderError),

    /// Error from the owning experiment (pool / cycle lookups).
    #[error("experiment error: {0}")]
    Experiment(#[from] ExperimentError),

    /// Error registering a read against the pool.
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    /// `isPerFile` mode requires exactly one cycle index per input file.
    #[error("isPerFile mode requires a per-file cycle assignment for file {0}")]
    MissingPerFileCycle(usize),

    /// A worker thread panicked.
    #[error("worker thread panicked: {0}")]
    ThreadPanicked(String),
}

/// One input file (or pair), plus its fixed cycle assignment in
/// `isPerFile` mode.
#[derive(Debug, Clone)]
pub struct InputFile {
    /// Path to the forward (or only, for single-end) read file.
    pub forward: PathBuf,
    /// Path to the mate file, for paired-end input.
    pub reverse: Option<PathBuf>,
    /// Index into `ParseConfig::cycles`, when `is_per_file` is set.
    pub per_file_cycle: Option<usize>,
}

/// A per-reason count of rejected reads, returned by [`run`] alongside the
/// count of reads successfully registered.
#[derive(Debug, Default)]
pub struct RejectionHistogram {
    counts: [AtomicU64; 6],
}

impl RejectionHistogram {
    fn index_of(reason: RejectionReason) -> usize {
        RejectionReason::ALL.iter().position(|r| *r == reason).expect("exhaustive ALL")
    }

    fn record(&self, reason: RejectionReason) {
        self.counts[Self::index_of(reason)].fetch_add(1, Ordering::Relaxed);
    }

    /// The count recorded for a single reason.
    pub fn get(&self, reason: RejectionReason) -> u64 {
        self.counts[Self::index_of(reason)].load(Ordering::Relaxed)
    }

    /// Total rejected reads across every reason.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }
}

/// Summary statistics returned once [`run`] joins every worker.
#[derive(Debug)]
pub struct RunSummary {
    /// Reads successfully registered into the pool (and a cycle, if one
    /// was resolved).
    pub registered: u64,
    /// Per-reason counts of skipped reads.
    pub rejections: RejectionHistogram,
}

enum Message {
    Work(RawPair),
    Poison,
}

struct RawPair {
    forward_bases: Vec<u8>,
    forward_qualities: Vec<u8>,
    reverse_bases: Option<Vec<u8>>,
    reverse_qualities: Option<Vec<u8>>,
    per_file_cycle: Option<usize>,
}

/// Run the producer/consumer pipeline over `inputs`, registering surviving
/// reads into `experiment`. Blocks until every input file is exhausted and
/// all consumers have drained the queue.
pub fn run(
    experiment: &Arc<Experiment>,
    config: &ParseConfig,
    inputs: &[InputFile],
) -> Result<RunSummary, AptaplexError> {
    let (tx, rx) = channel::bounded::<Message>(config.queue_capacity.max(1));

    // spec.md §4.8: N = min(cores, configured max) total threads, one of
    // which is the producer (running on the calling thread); N-1 consumers.
    let n = std::cmp::min(num_cpus::get(), config.max_threads.max(1)).max(1);
    let worker_count = n.saturating_sub(1).max(1);
    debug!(worker_count, inputs = inputs.len(), "aptaplex driver starting");

    let registered = Arc::new(AtomicU64::new(0));
    let rejections = Arc::new(RejectionHistogram::default());

    let mut consumers = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let rx: Receiver<Message> = rx.clone();
        let tx: Sender<Message> = tx.clone();
        let experiment = Arc::clone(experiment);
        let config = config.clone();
        let registered = Arc::clone(&registered);
        let rejections = Arc::clone(&rejections);

        consumers.push(thread::spawn(move || -> Result<(), AptaplexError> {
            loop {
                match rx.recv() {
                    Ok(Message::Work(pair)) => {
                        process_pair(&experiment, &config, pair, &registered, &rejections)?;
                    }
                    Ok(Message::Poison) => {
                        // Propagate the sentinel to the next consumer, then exit.
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

    produce(inputs, config, &tx)?;
    let _ = tx.send(Message::Poison);
    drop(tx);

    for handle in consumers {
        handle
            .join()
            .map_err(|e| AptaplexError::ThreadPanicked(format!("{e:?}")))??;
    }

    Ok(RunSummary {
        registered: registered.load(Ordering::Relaxed),
        rejections: Arc::try_unwrap(rejections).unwrap_or_default(),
    })
}

fn produce(inputs: &[InputFile], config: &ParseConfig, tx: &Sender<Message>) -> Result<(), AptaplexError> {
    for (file_idx, input) in inputs.iter().enumerate() {
        if config.is_per_file && input.per_file_cycle.is_none() {
            return Err(AptaplexError::MissingPerFileCycle(file_idx));
        }

        let mut fwd_reader = reader::open(&input.forward)?;
        let mut rev_reader = match &input.reverse {
            Some(path) => Some(reader::open(path)?),
            None => None,
        };

        loop {
            let Some(fwd) = fwd_reader.next_record()? else {
                break;
            };
            let rev = match &mut rev_reader {
                Some(r) => r.next_record()?,
                None => None,
            };

            let pair = RawPair {
                forward_bases: fwd.bases,
                forward_qualities: fwd.qualities.unwrap_or_default(),
                reverse_bases: rev.as_ref().map(|r| r.bases.clone()),
                reverse_qualities: rev.and_then(|r| r.qualities),
                per_file_cycle: input.per_file_cycle,
            };

            if tx.send(Message::Work(pair)).is_err() {
                // Every consumer has exited (e.g. after a fatal error);
                // stop producing.
                return Ok(());
            }
        }
    }
    Ok(())
}

fn process_pair(
    experiment: &Arc<Experiment>,
    config: &ParseConfig,
    pair: RawPair,
    registered: &AtomicU64,
    rejections: &RejectionHistogram,
) -> Result<(), AptaplexError> {
    let (bases, qualities) = if let Some(reverse_bases) = pair.reverse_bases {
        let reverse_qualities = pair.reverse_qualities.unwrap_or_default();
        let stitch_config = StitchConfig {
            min_overlap: config.min_overlap,
            max_mismatch_rate: config.max_mismatch_rate,
        };
        match stitch::stitch(
            &pair.forward_bases,
            &pair.forward_qualities,
            &reverse_bases,
            &reverse_qualities,
            &stitch_config,
        ) {
            Ok(stitched) => (stitched.bases, stitched.qualities),
            Err(StitchError::NoOverlap) => {
                rejections.record(RejectionReason::OverlapFailed);
                return Ok(());
            }
        }
    } else {
        (pair.forward_bases, pair.forward_qualities)
    };

    let bases: Vec<u8> = bases.iter().map(|b| b.to_ascii_uppercase()).collect();

    let outcome = match matcher::match_read(&bases, &qualities, config) {
        Ok(outcome) => outcome,
        Err(e) => {
            rejections.record(match e {
                MatchError::Primer5Unmatched | MatchError::Primer3Unmatched => {
                    RejectionReason::PrimerUnmatched
                }
                MatchError::RandomizedLengthOutOfBounds(_) => RejectionReason::RecordMalformed,
                MatchError::BarcodeCollision => RejectionReason::BarcodeCollision,
                MatchError::BarcodeUnmatched => RejectionReason::BarcodeUnmatched,
                MatchError::QualityTooLow(_) => RejectionReason::QualityTooLow,
            });
            return Ok(());
        }
    };

    let cycle_idx = if config.is_per_file {
        pair.per_file_cycle
    } else {
        outcome.cycle_index
    };

    let primer5_trim = outcome.start;
    let primer3_trim = bases.len() as u32 - outcome.end;

    match cycle_idx {
        Some(idx) => {
            let cycle_config = config.cycles[idx].clone();
            let cycle = experiment.open_cycle(cycle_config)?;
            cycle.add(experiment.pool(), &bases, primer5_trim, primer3_trim)?;
        }
        None => {
            experiment.pool().register(&bases, primer5_trim, primer3_trim)?;
        }
    }

    registered.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BloomConfig, CycleConfig};
    use std::io::Write;
    use tempfile::tempdir;

    fn write_fastq(path: &std::path::Path, records: &[(&str, &str, &str)]) {
        let mut f = std::fs::File::create(path).unwrap();
        for (header, seq, qual) in records {
            writeln!(f, "@{header}\n{seq}\n+\n{qual}").unwrap();
        }
    }

    fn base_config() -> ParseConfig {
        ParseConfig {
            primer5: b"AAA".to_vec(),
            primer3: b"TTT".to_vec(),
            cycles: vec![CycleConfig {
                round: 0,
                name: "library".into(),
                barcode5: None,
                barcode3: None,
                is_control: false,
                is_counter: false,
            }],
            min_overlap: 6,
            max_mismatch_rate: 0.0,
            tolerance: 0,
            max_leading: 10,
            max_trailing: 10,
            min_randomized: 1,
            max_randomized: 100,
            min_mean_quality: 0.0,
            is_per_file: true,
            bloom: BloomConfig::default(),
            queue_capacity: 16,
            max_threads: 2,
        }
    }

    #[test]
    fn single_end_file_registers_reads_into_per_file_cycle() {
        let dir = tempdir().unwrap();
        let fastq_path = dir.path().join("r1.fastq");
        write_fastq(
            &fastq_path,
            &[
                ("r1", "AAACGTCGTTT", "IIIIIIIIIII"),
                ("r2", "AAACGTCGTTT", "IIIIIIIIIII"),
                ("r3", "AAAGGGGGTTT", "IIIIIIIIIII"),
            ],
        );

        let experiment = Experiment::open(dir.path().join("project"), BloomConfig::default()).unwrap();
        let config = base_config();
        let inputs = vec![InputFile {
            forward: fastq_path,
            reverse: None,
            per_file_cycle: Some(0),
        }];

        let summary = run(&experiment, &config, &inputs).unwrap();
        assert_eq!(summary.registered, 3);
        assert_eq!(summary.rejections.total(), 0);
        assert_eq!(experiment.pool().size(), 2);

        let cycle = experiment.open_cycle(config.cycles[0].clone()).unwrap();
        assert_eq!(cycle.size(), 3);
        assert_eq!(cycle.unique_size(), 2);
    }

    #[test]
    fn malformed_and_unmatched_reads_are_counted_not_fatal() {
        let dir = tempdir().unwrap();
        let fastq_path = dir.path().join("r1.fastq");
        write_fastq(
            &fastq_path,
            &[
                ("good", "AAACGTCGTTT", "IIIIIIIIIII"),
                ("bad", "CCCCGTCGTTT", "IIIIIIIIIII"),
            ],
        );

        let experiment = Experiment::open(dir.path().join("project"), BloomConfig::default()).unwrap();
        let config = base_config();
        let inputs = vec![InputFile {
            forward: fastq_path,
            reverse: None,
            per_file_cycle: Some(0),
        }];

        let summary = run(&experiment, &config, &inputs).unwrap();
        assert_eq!(summary.registered, 1);
        assert_eq!(summary.rejections.get(RejectionReason::PrimerUnmatched), 1);
    }
}
