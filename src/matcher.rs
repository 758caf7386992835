//! Primer/barcode anchoring against the stitched read (spec.md §4.7).

use thiserror::Error;

use crate::config::{CycleConfig, ParseConfig};

/// Rejection reasons raised while matching a read against primers,
/// barcodes, and quality thresholds. Mirrors the error kinds of spec.md
/// §7 that originate in this stage.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchError {
    /// No 5' primer match within `max_leading` bases met `tolerance`.
    #[error("5' primer unmatched")]
    Primer5Unmatched,

    /// No 3' primer match within `max_trailing` bases met `tolerance`.
    #[error("3' primer unmatched")]
    Primer3Unmatched,

    /// The randomized region fell outside `[min_randomized, max_randomized]`.
    #[error("randomized region length {0} outside configured bounds")]
    RandomizedLengthOutOfBounds(usize),

    /// More than one cycle's barcodes matched the read's flanks.
    #[error("ambiguous barcode match across cycles")]
    BarcodeCollision,

    /// No configured cycle's barcodes matched the read's flanks.
    #[error("no cycle barcode matched")]
    BarcodeUnmatched,

    /// Mean phred quality in the randomized region fell below
    /// `min_mean_quality`.
    #[error("mean quality {0} below threshold")]
    QualityTooLow(f64),
}

/// The result of successfully matching a read: primer-trim offsets and
/// the index into `ParseConfig::cycles` the read was routed to (`None`
/// when the configuration carries no barcodes, i.e. every surviving read
/// belongs to whichever cycle the caller assigns by other means, such as
/// `isPerFile` mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Offset where the randomized region starts (end of the 5' primer).
    pub start: u32,
    /// Offset where the randomized region ends (start of the 3' primer).
    pub end: u32,
    /// Index into the configured cycles this read was demultiplexed to,
    /// if barcodes are in play.
    pub cycle_index: Option<usize>,
}

/// Hamming distance between two equal-length byte slices, shifted by
/// `offset` into `haystack`. Returns `usize::MAX` if `needle` does not fit
/// at `offset`.
fn hamming_at(haystack: &[u8], offset: usize, needle: &[u8]) -> usize {
    if offset + needle.len() > haystack.len() {
        return usize::MAX;
    }
    haystack[offset..offset + needle.len()]
        .iter()
        .zip(needle.iter())
        .filter(|(a, b)| a != b)
        .count()
}

/// Find the best-matching offset for `needle` within
/// `haystack[..search_window.min(haystack.len())]`, scanning every
/// feasible offset and returning the lowest mismatch count, ties broken by
/// the earliest offset.
fn best_anchor(haystack: &[u8], needle: &[u8], search_window: usize) -> Option<(usize, usize)> {
    let window_end = search_window.min(haystack.len());
    let mut best: Option<(usize, usize)> = None;
    for offset in 0..window_end {
        if offset + needle.len() > haystack.len() {
            break;
        }
        let mismatches = hamming_at(haystack, offset, needle);
        if best.is_none_or(|(_, best_mm)| mismatches < best_mm) {
            best = Some((offset, mismatches));
        }
    }
    best
}

/// Anchor the 3' primer by scanning offsets within the last
/// `search_window` bases of `haystack`.
fn best_anchor_from_end(haystack: &[u8], needle: &[u8], search_window: usize) -> Option<(usize, usize)> {
    if haystack.len() < needle.len() {
        return None;
    }
    let earliest_end_start = haystack.len().saturating_sub(search_window);
    let mut best: Option<(usize, usize)> = None;
    for start in earliest_end_start..=(haystack.len() - needle.len()) {
        let mismatches = hamming_at(haystack, start, needle);
        if best.is_none_or(|(_, best_mm)| mismatches < best_mm) {
            best = Some((start, mismatches));
        }
    }
    best
}

/// Mean phred quality (raw phred value, not error probability) over
/// `qualities`.
fn mean_quality(qualities: &[u8]) -> f64 {
    if qualities.is_empty() {
        return 0.0;
    }
    let sum: u64 = qualities.iter().map(|&q| q as u64).sum();
    sum as f64 / qualities.len() as f64
}

fn barcodes_match(
    cycle: &CycleConfig,
    bases: &[u8],
    primer5_offset: usize,
    primer3_end: usize,
    tolerance: usize,
) -> bool {
    let bc5_ok = match &cycle.barcode5 {
        None => true,
        Some(bc) => {
            bc.len() <= primer5_offset
                && hamming_at(bases, primer5_offset - bc.len(), bc) <= tolerance
        }
    };
    let bc3_ok = match &cycle.barcode3 {
        None => true,
        Some(bc) => hamming_at(bases, primer3_end, bc) <= tolerance,
    };
    bc5_ok && bc3_ok
}

/// Run the full matching procedure of spec.md §4.7 against a stitched
/// read's `bases`/`qualities`.
pub fn match_read(bases: &[u8], qualities: &[u8], config: &ParseConfig) -> Result<MatchOutcome, MatchError> {
    let (p5_offset, p5_mismatches) = best_anchor(bases, &config.primer5, config.max_leading)
        .ok_or(MatchError::Primer5Unmatched)?;
    if p5_mismatches > config.tolerance {
        return Err(MatchError::Primer5Unmatched);
    }
    let start = p5_offset + config.primer5.len();

    let (p3_offset, p3_mismatches) = best_anchor_from_end(bases, &config.primer3, config.max_trailing)
        .ok_or(MatchError::Primer3Unmatched)?;
    if p3_mismatches > config.tolerance {
        return Err(MatchError::Primer3Unmatched);
    }
    let end = p3_offset;

    if end < start {
        return Err(MatchError::RandomizedLengthOutOfBounds(0));
    }
    let randomized_len = end - start;
    if randomized_len < config.min_randomized || randomized_len > config.max_randomized {
        return Err(MatchError::RandomizedLengthOutOfBounds(randomized_len));
    }

    let window = &qualities[start..end];
    let mean_q = mean_quality(window);
    if mean_q < config.min_mean_quality {
        return Err(MatchError::QualityTooLow(mean_q));
    }

    let has_barcodes = config.cycles.iter().any(|c| c.barcode5.is_some() || c.barcode3.is_some());
    let cycle_index = if has_barcodes {
        let mut matches: Vec<usize> = Vec::new();
        for (idx, cycle) in config.cycles.iter().enumerate() {
            if barcodes_match(cycle, bases, p5_offset, end + config.primer3.len(), config.tolerance) {
                matches.push(idx);
            }
        }
        match matches.len() {
            0 => return Err(MatchError::BarcodeUnmatched),
            1 => Some(matches[0]),
            _ => return Err(MatchError::BarcodeCollision),
        }
    } else {
        None
    };

    Ok(MatchOutcome {
        start: start as u32,
        end: end as u32,
        cycle_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BloomConfig;

    fn base_config() -> ParseConfig {
        ParseConfig {
            primer5: b"AAA".to_vec(),
            primer3: b"TTT".to_vec(),
            cycles: Vec::new(),
            min_overlap: 6,
            max_mismatch_rate: 0.0,
            tolerance: 0,
            max_leading: 10,
            max_trailing: 10,
            min_randomized: 1,
            max_randomized: 100,
            min_mean_quality: 0.0,
            is_per_file: false,
            bloom: BloomConfig::default(),
            queue_capacity: 256,
            max_threads: 4,
        }
    }

    #[test]
    fn s4_primer_trim_scenario() {
        let config = base_config();
        let bases = b"AAACGTCGTTT";
        let qualities = vec![b'I'; bases.len()];
        let outcome = match_read(bases, &qualities, &config).unwrap();
        assert_eq!((outcome.start, outcome.end), (3, 8));
        assert_eq!(&bases[outcome.start as usize..outcome.end as usize], b"CGTCG");
    }

    #[test]
    fn s5_barcode_demux_scenario() {
        let mut config = base_config();
        config.cycles = vec![
            CycleConfig {
                round: 1,
                name: "c1".into(),
                barcode5: Some(b"AT".to_vec()),
                barcode3: Some(b"GC".to_vec()),
                is_control: false,
                is_counter: false,
            },
            CycleConfig {
                round: 1,
                name: "c2".into(),
                barcode5: Some(b"CG".to_vec()),
                barcode3: Some(b"TA".to_vec()),
                is_control: false,
                is_counter: false,
            },
        ];

        let bases = [&b"AT"[..], b"AAA", b"CGTCG", b"TTT", b"GC"].concat();
        let qualities = vec![b'I'; bases.len()];
        let outcome = match_read(&bases, &qualities, &config).unwrap();
        assert_eq!(outcome.cycle_index, Some(0));
    }

    #[test]
    fn rejects_missing_primer() {
        let config = base_config();
        let bases = b"CCCCGTCGTTT";
        let qualities = vec![b'I'; bases.len()];
        assert_eq!(match_read(bases, &qualities, &config), Err(MatchError::Primer5Unmatched));
    }

    #[test]
    fn rejects_randomized_region_too_short() {
        let mut config = base_config();
        config.min_randomized = 10;
        let bases = b"AAACGTTT";
        let qualities = vec![b'I'; bases.len()];
        assert!(matches!(
            match_read(bases, &qualities, &config),
            Err(MatchError::RandomizedLengthOutOfBounds(_))
        ));
    }

    #[test]
    fn rejects_low_quality_randomized_region() {
        let mut config = base_config();
        config.min_mean_quality = 50.0;
        let bases = b"AAACGTCGTTT";
        let qualities = vec![b'!'; bases.len()];
        assert!(matches!(
            match_read(bases, &qualities, &config),
            Err(MatchError::QualityTooLow(_))
        ));
    }

    #[test]
    fn rejects_barcode_collision() {
        let mut config = base_config();
        config.tolerance = 2;
        config.cycles = vec![
            CycleConfig {
                round: 1,
                name: "c1".into(),
                barcode5: Some(b"AT".to_vec()),
                barcode3: None,
                is_control: false,
                is_counter: false,
            },
            CycleConfig {
                round: 1,
                name: "c2".into(),
                barcode5: Some(b"AG".to_vec()),
                barcode3: None,
                is_control: false,
                is_counter: false,
            },
        ];
        let bases = [&b"AT"[..], b"AAA", b"CGTCG", b"TTT"].concat();
        let qualities = vec![b'I'; bases.len()];
        assert_eq!(match_read(&bases, &qualities, &config), Err(MatchError::BarcodeCollision));
    }
}
