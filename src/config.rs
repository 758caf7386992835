//! Injected configuration structs.
//!
//! Following the teacher's `EngineConfig` shape: plain public-field structs,
//! constructed by the caller (the CLI front end, a config file loader —
//! both out of scope here per spec.md §1) and passed into `open`/`new`. No
//! defaults are baked into the types beyond a `Default` impl for tests.

/// Bloom filter sizing shared by the pool and every selection cycle.
#[derive(Debug, Clone, Copy)]
pub struct BloomConfig {
    /// Expected number of distinct items the filter will hold.
    pub capacity: usize,
    /// Target false-positive rate at `capacity` live items.
    pub fp_rate: f64,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000_000,
            fp_rate: 0.01,
        }
    }
}

/// Per-cycle configuration: round number, optional barcodes, and the two
/// orthogonal cycle-kind flags from spec.md §3.
#[derive(Debug, Clone)]
pub struct CycleConfig {
    /// Round number (>= 0; initial library is round 0).
    pub round: u32,
    /// Stable name distinguishing cycles within the same round (e.g.
    /// multiple counter-selections at round 3).
    pub name: String,
    /// Optional 5' barcode sequence for this cycle.
    pub barcode5: Option<Vec<u8>>,
    /// Optional 3' barcode sequence for this cycle.
    pub barcode3: Option<Vec<u8>>,
    /// Whether this cycle is a negative control.
    pub is_control: bool,
    /// Whether this cycle is a counter-selection.
    pub is_counter: bool,
}

/// Thresholds and primer/barcode configuration for the AptaPlex pipeline.
#[derive(Debug, Clone)]
pub struct ParseConfig {
    /// 5' primer sequence, anchored at the start of the stitched read.
    pub primer5: Vec<u8>,
    /// 3' primer sequence, anchored at the end of the stitched read.
    pub primer3: Vec<u8>,
    /// Per-cycle configuration, ordered by round then declaration order.
    pub cycles: Vec<CycleConfig>,
    /// Minimum paired-end overlap length (stitcher).
    pub min_overlap: usize,
    /// Maximum mismatch rate over the overlap region (stitcher).
    pub max_mismatch_rate: f64,
    /// Maximum Hamming-distance mismatches tolerated when anchoring a
    /// primer or barcode.
    pub tolerance: usize,
    /// Only search for the 5' primer within this many leading bases.
    pub max_leading: usize,
    /// Only search for the 3' primer within this many trailing bases.
    pub max_trailing: usize,
    /// Minimum length of the randomized region (after primer trimming).
    pub min_randomized: usize,
    /// Maximum length of the randomized region (after primer trimming).
    pub max_randomized: usize,
    /// Minimum mean phred quality (as a raw phred value, not probability)
    /// required in the randomized region.
    pub min_mean_quality: f64,
    /// Whether each input file (rather than a barcode) assigns a read to a
    /// fixed selection cycle (`isPerFile` mode in spec.md §4.8).
    pub is_per_file: bool,
    /// Bloom sizing for the pool and every cycle.
    pub bloom: BloomConfig,
    /// Bounded work-queue capacity between the producer and consumers.
    pub queue_capacity: usize,
    /// Upper bound on consumer thread count; actual count is
    /// `min(available_parallelism, max_threads)`.
    pub max_threads: usize,
}

/// Configuration for the CapR engine and its parallel driver.
#[derive(Debug, Clone, Copy)]
pub struct CapRConfig {
    /// Folding temperature in degrees Celsius.
    pub temperature: f64,
    /// Maximum interior-loop / multi-branch span considered by the DP.
    pub max_span: usize,
    /// Bounded work-queue capacity between the producer and consumers.
    pub queue_capacity: usize,
    /// Upper bound on consumer thread count; actual count is
    /// `min(available_parallelism, max_threads)`.
    pub max_threads: usize,
}

impl Default for CapRConfig {
    fn default() -> Self {
        Self {
            temperature: 37.0,
            max_span: 30,
            queue_capacity: 256,
            max_threads: 8,
        }
    }
}
