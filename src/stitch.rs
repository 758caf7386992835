//! Paired-end overlap stitcher (spec.md §4.6).

use thiserror::Error;

/// Errors / rejections returned by [`stitch`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StitchError {
    /// No overlap satisfied `min_overlap` and `max_mismatch_rate`.
    #[error("no overlap satisfying the configured constraints")]
    NoOverlap,
}

/// Configuration consulted by [`stitch`].
#[derive(Debug, Clone, Copy)]
pub struct StitchConfig {
    /// Minimum overlap length between the 3' end of the forward read and
    /// the 5' end of the reverse-complemented reverse read.
    pub min_overlap: usize,
    /// Maximum fraction of mismatched bases tolerated over the overlap.
    pub max_mismatch_rate: f64,
}

/// The result of stitching a mate pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stitched {
    /// The merged sequence.
    pub bases: Vec<u8>,
    /// Per-base consensus qualities, same length as `bases`.
    pub qualities: Vec<u8>,
}

/// Reverse-complement a DNA byte sequence. Non-ACGT bytes pass through
/// unchanged (case-sensitive; callers normalize to uppercase beforehand).
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement_base(b)).collect()
}

fn complement_base(b: u8) -> u8 {
    match b {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        other => other,
    }
}

/// Stitch forward read `(f, qf)` against reverse read `(r, qr)` by finding
/// the best overlap between the 3' end of `f` and the 5' end of
/// `reverse_complement(r)`.
///
/// For each candidate overlap length (from the longest down to
/// `min_overlap`), mismatches are counted over the overlap window; the
/// first length meeting `max_mismatch_rate` wins, so ties are broken by
/// longer overlap (spec.md §4.6). The stitched sequence is
/// `f[0..i] ++ consensus(overlap) ++ r'[j..]`; consensus at each column
/// picks the higher-quality base, keeping `f`'s base on a tie.
pub fn stitch(
    f: &[u8],
    qf: &[u8],
    r: &[u8],
    qr: &[u8],
    config: &StitchConfig,
) -> Result<Stitched, StitchError> {
    debug_assert_eq!(f.len(), qf.len());
    debug_assert_eq!(r.len(), qr.len());

    let r_rc = reverse_complement(r);
    let qr_rc: Vec<u8> = qr.iter().rev().copied().collect();

    let max_overlap = f.len().min(r_rc.len());
    let mut best: Option<(usize, usize)> = None; // (overlap_len, mismatches)

    for overlap_len in (config.min_overlap..=max_overlap).rev() {
        let f_start = f.len() - overlap_len;
        let f_window = &f[f_start..];
        let r_window = &r_rc[..overlap_len];

        let mismatches = f_window
            .iter()
            .zip(r_window.iter())
            .filter(|(a, b)| a != b)
            .count();

        let rate = mismatches as f64 / overlap_len as f64;
        if rate <= config.max_mismatch_rate {
            best = Some((overlap_len, mismatches));
            break;
        }
    }

    let (overlap_len, _) = best.ok_or(StitchError::NoOverlap)?;
    let f_start = f.len() - overlap_len;

    let mut bases = Vec::with_capacity(f.len() + r_rc.len() - overlap_len);
    let mut qualities = Vec::with_capacity(bases.capacity());

    bases.extend_from_slice(&f[..f_start]);
    qualities.extend_from_slice(&qf[..f_start]);

    for k in 0..overlap_len {
        let (fb, fq) = (f[f_start + k], qf[f_start + k]);
        let (rb, rq) = (r_rc[k], qr_rc[k]);
        if rq > fq {
            bases.push(rb);
            qualities.push(rq);
        } else {
            bases.push(fb);
            qualities.push(fq);
        }
    }

    bases.extend_from_slice(&r_rc[overlap_len..]);
    qualities.extend_from_slice(&qr_rc[overlap_len..]);

    Ok(Stitched { bases, qualities })
}
