//! The CapR partition-function engine (spec.md §4.9).
//!
//! Computes, per base of an RNA/DNA sequence, a probability distribution
//! over six structural contexts — bulge (B), external (E), hairpin (H),
//! interior loop (I), multi-loop (M), stem (S) — via a banded McCaskill-style
//! inside/outside partition-function recursion over base-pair probabilities.
//!
//! **Simplification from full CapR semantics** (recorded in `DESIGN.md`):
//! real CapR maintains separate inside/outside accumulators per structural
//! context so every position's six probabilities are a continuous mixture.
//! Here the stem/non-stem split is a genuine continuous quantity, computed
//! from the inside-outside base-pair probability matrix; which *single*
//! non-stem bucket absorbs the remaining probability mass is decided by a
//! maximum-expected-accuracy reference fold built greedily from that same
//! matrix. This keeps the dominant signal (is this base paired?) fully
//! probabilistic while keeping the engine's size proportionate to this
//! exercise.

use crate::capr::tables::{
    self, BULGE_INIT_BASE, GAS_CONSTANT, INTERIOR_ASYMMETRY_CAP, INTERIOR_ASYMMETRY_PENALTY,
    INTERIOR_INIT_BASE, MIN_HAIRPIN_UNPAIRED, MULTILOOP_INIT, MULTILOOP_PER_BRANCH,
    MULTILOOP_PER_UNPAIRED, ZERO_FLOOR,
};
use crate::config::CapRConfig;
use thiserror::Error;

/// Errors returned by [`fold`].
#[derive(Debug, Error, PartialEq)]
pub enum CapRError {
    /// The input sequence was empty.
    #[error("empty sequence")]
    EmptySequence,

    /// A byte in the sequence was not one of A/C/G/T/U (case-insensitive).
    #[error("invalid base {0:?} at position {1}")]
    InvalidBase(u8, usize),
}

/// The six structural contexts a base may occupy, in the order spec.md §3
/// lists them for the `(B, E, H, I, M, S)` tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum StructContext {
    Bulge = 0,
    External = 1,
    Hairpin = 2,
    Interior = 3,
    Multiloop = 4,
    Stem = 5,
}

impl StructContext {
    const ALL: [StructContext; 6] = [
        StructContext::Bulge,
        StructContext::External,
        StructContext::Hairpin,
        StructContext::Interior,
        StructContext::Multiloop,
        StructContext::Stem,
    ];
}

/// A 6×L structural profile: one probability vector per base, each summing
/// to 1 within `1e-6` (spec.md §3, §8 invariant 5).
#[derive(Debug, Clone)]
pub struct Profile {
    length: usize,
    probs: Vec<[f64; 6]>,
}

impl Profile {
    /// Sequence length this profile was computed for.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether this profile covers zero bases.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The six-context probability vector at `position`, ordered
    /// `[B, E, H, I, M, S]`.
    pub fn context_probs(&self, position: usize) -> [f64; 6] {
        self.probs[position]
    }

    /// The probability mass assigned to `context` at `position`.
    pub fn probability(&self, position: usize, context: StructContext) -> f64 {
        self.probs[position][context as usize]
    }

    /// The context with the highest probability at `position`.
    pub fn dominant_context(&self, position: usize) -> StructContext {
        let probs = &self.probs[position];
        StructContext::ALL
            .into_iter()
            .max_by(|a, b| probs[*a as usize].total_cmp(&probs[*b as usize]))
            .unwrap_or(StructContext::External)
    }

    /// Serialize this profile as a flat, row-major array of `6 * length`
    /// little-endian f64 values (for the optional profile store of
    /// spec.md §6).
    pub fn to_packed_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.length * 6 * 8);
        for probs in &self.probs {
            for p in probs {
                out.extend_from_slice(&p.to_le_bytes());
            }
        }
        out
    }
}

struct Thermo {
    rt: f64,
}

impl Thermo {
    fn new(temperature_celsius: f64) -> Self {
        Self {
            rt: GAS_CONSTANT * (temperature_celsius + 273.15),
        }
    }

    fn boltzmann(&self, delta_g: f64) -> f64 {
        let factor = (-delta_g / self.rt).exp();
        if factor < ZERO_FLOOR { 0.0 } else { factor }
    }
}

fn hairpin_energy(loop_len: usize) -> f64 {
    tables::HAIRPIN_INIT_BASE
        + 1.75 * (loop_len as f64 / tables::HAIRPIN_REF_LEN).ln().max(0.0)
}

fn bulge_interior_energy(left_len: usize, right_len: usize) -> f64 {
    let total = left_len + right_len;
    if left_len == 0 || right_len == 0 {
        BULGE_INIT_BASE + 1.75 * (total.max(1) as f64).ln().max(0.0)
    } else {
        let asym = (INTERIOR_ASYMMETRY_PENALTY * (left_len as f64 - right_len as f64).abs())
            .min(INTERIOR_ASYMMETRY_CAP);
        INTERIOR_INIT_BASE + 1.75 * (total as f64).ln().max(0.0) + asym
    }
}

/// Banded inside/outside tables, all indexed densely for clarity; a
/// production engine would store these in `O(L * max_span)` banded arrays
/// instead of the dense `O(L^2)` here (documented in `DESIGN.md`).
struct Tables {
    n: usize,
    max_span: usize,
    zb: Vec<Vec<f64>>,
    zm: Vec<Vec<f64>>,
}

impl Tables {
    fn zb(&self, i: usize, j: usize) -> f64 {
        if j <= i { 0.0 } else { self.zb[i][j] }
    }

    /// `Zm[i][j]` with the convention `Zm[i][i-1] == 1` (empty region),
    /// represented by treating `i > j` as the empty case.
    fn zm(&self, i: isize, j: isize) -> f64 {
        if i > j {
            1.0
        } else if j as usize >= self.n || i < 0 {
            0.0
        } else {
            self.zm[i as usize][j as usize]
        }
    }
}

fn build_tables(codes: &[u8], thermo: &Thermo, max_span: usize) -> Tables {
    let n = codes.len();
    let mut zb = vec![vec![0.0f64; n]; n];
    let mut zm = vec![vec![0.0f64; n]; n];

    for d in 0..=max_span.min(n.saturating_sub(1)) {
        // Zb[i][j], j = i + d.
        if d >= MIN_HAIRPIN_UNPAIRED + 1 {
            for i in 0..n {
                let j = i + d;
                if j >= n {
                    break;
                }
                if !tables::can_pair(codes[i], codes[j]) {
                    continue;
                }

                let mut z = 0.0;
                let loop_len = j - i - 1;
                z += thermo.boltzmann(hairpin_energy(loop_len));

                let max_inner_span = d.saturating_sub(2);
                for ip in i + 1..j {
                    for jp in (ip + 1)..j {
                        if jp - ip > max_inner_span {
                            continue;
                        }
                        let inner = zb[ip][jp];
                        if inner <= 0.0 || !tables::can_pair(codes[ip], codes[jp]) {
                            continue;
                        }
                        let left = ip - i - 1;
                        let right = j - jp - 1;
                        if left == 0 && right == 0 {
                            let e = tables::stack_energy(codes[i], codes[j], codes[ip], codes[jp]);
                            z += thermo.boltzmann(e) * inner;
                        } else {
                            let e = bulge_interior_energy(left, right);
                            z += thermo.boltzmann(e) * inner;
                        }
                    }
                }

                let multi_inner = zm.get(i + 1).and_then(|row| row.get(j - 1)).copied().unwrap_or(0.0);
                z += thermo.boltzmann(MULTILOOP_INIT) * multi_inner;

                zb[i][j] = z;
            }
        }

        // Zm[i][j], j = i + d: zero or more helices/unpaired bases.
        for i in 0..n {
            let j = i + d;
            if j >= n {
                break;
            }
            let unpaired_prev = if j == 0 { 1.0 } else { zm_get(&zm, i, j.wrapping_sub(1), n) };
            let mut z = unpaired_prev * thermo.boltzmann(MULTILOOP_PER_UNPAIRED);

            for k in i..=j {
                let pair = zb[k][j];
                if pair <= 0.0 {
                    continue;
                }
                let prefix = if k == 0 { 1.0 } else { zm_get(&zm, i, k - 1, n) };
                z += prefix * pair * thermo.boltzmann(MULTILOOP_PER_BRANCH);
            }

            zm[i][j] = z;
        }
    }

    Tables { n, max_span, zb, zm }
}

fn zm_get(zm: &[Vec<f64>], i: usize, j: usize, n: usize) -> f64 {
    if j >= n || i > j { 1.0 } else { zm[i][j] }
}

fn exterior_forward(tables: &Tables) -> Vec<f64> {
    let n = tables.n;
    let mut z = vec![0.0f64; n + 1];
    z[0] = 1.0;
    for m in 0..n {
        let mut acc = z[m];
        let j = m;
        let lo = j.saturating_sub(tables.max_span);
        for k in lo..=j {
            let pair = tables.zb(k, j);
            if pair <= 0.0 {
                continue;
            }
            acc += pair * z[k];
        }
        z[m + 1] = acc;
    }
    z
}

fn exterior_backward(tables: &Tables) -> Vec<f64> {
    let n = tables.n;
    let mut z = vec![0.0f64; n + 1];
    z[n] = 1.0;
    for m in (0..n).rev() {
        let mut acc = z[m + 1];
        let i = m;
        let hi = (i + tables.max_span).min(n - 1);
        for l in i..=hi {
            let pair = tables.zb(i, l);
            if pair <= 0.0 {
                continue;
            }
            acc += pair * z[l + 1];
        }
        z[m] = acc;
    }
    z
}

/// Outside partition function for a pair `(i,j)`: everything that can sit
/// around `(i,j)` given it is already formed. Computed by enclosing-span
/// (largest spans first) summing the exterior-loop term and the
/// stack/bulge/interior-outside term; multi-loop-mediated outside
/// contributions are not modeled (see module docs).
fn outside_pairs(
    tables: &Tables,
    codes: &[u8],
    thermo: &Thermo,
    z_fwd: &[f64],
    z_bwd: &[f64],
) -> Vec<Vec<f64>> {
    let n = tables.n;
    let mut zob = vec![vec![0.0f64; n]; n];

    let max_span = tables.max_span;
    let mut d = max_span.min(n.saturating_sub(1));
    loop {
        if d < MIN_HAIRPIN_UNPAIRED + 1 {
            break;
        }
        for i in 0..n {
            let j = i + d;
            if j >= n {
                continue;
            }
            if !tables::can_pair(codes[i], codes[j]) {
                continue;
            }

            let mut total = z_fwd[i] * z_bwd[j + 1];

            let extra = max_span.saturating_sub(d);
            let i0_lo = i.saturating_sub(extra);
            let j0_hi = (j + extra).min(n - 1);
            for i0 in i0_lo..i {
                for j0 in (j + 1)..=j0_hi {
                    if j0 - i0 > max_span {
                        continue;
                    }
                    if !tables::can_pair(codes[i0], codes[j0]) {
                        continue;
                    }
                    let outer_outside = zob[i0][j0];
                    if outer_outside <= 0.0 {
                        continue;
                    }
                    let left = i - i0 - 1;
                    let right = j0 - j - 1;
                    let term = if left == 0 && right == 0 {
                        thermo.boltzmann(tables::stack_energy(codes[i0], codes[j0], codes[i], codes[j]))
                    } else {
                        thermo.boltzmann(bulge_interior_energy(left, right))
                    };
                    total += term * outer_outside;
                }
            }

            zob[i][j] = total;
        }
        if d == 0 {
            break;
        }
        d -= 1;
    }

    zob
}

/// A non-crossing reference fold built greedily from the base-pair
/// probability matrix (maximum-expected-accuracy style): highest-probability
/// pairs are accepted first, skipping any that would cross or reuse an
/// already-committed base.
fn greedy_reference_fold(bpp: &[Vec<f64>], n: usize) -> Vec<Option<usize>> {
    let mut candidates: Vec<(usize, usize, f64)> = Vec::new();
    for i in 0..n {
        for j in (i + MIN_HAIRPIN_UNPAIRED + 1)..n {
            let p = bpp[i][j];
            if p > 0.01 {
                candidates.push((i, j, p));
            }
        }
    }
    candidates.sort_by(|a, b| b.2.total_cmp(&a.2));

    let mut partner: Vec<Option<usize>> = vec![None; n];
    for (i, j, _) in candidates {
        if partner[i].is_some() || partner[j].is_some() {
            continue;
        }
        let crosses = (0..n).any(|k| {
            if let Some(l) = partner[k] {
                let k_inside = k > i && k < j;
                let l_inside = l > i && l < j;
                k_inside != l_inside
            } else {
                false
            }
        });
        if crosses {
            continue;
        }
        partner[i] = Some(j);
        partner[j] = Some(i);
    }
    partner
}

/// Classify every unpaired base in `partner` by recursively walking the
/// loop structure it forms, assigning `StructContext::External`,
/// `Hairpin`, `Bulge`, `Interior`, or `Multiloop`.
fn classify_unpaired(partner: &[Option<usize>], n: usize) -> Vec<StructContext> {
    let mut ctx = vec![StructContext::External; n];
    classify_region(partner, 0, n.wrapping_sub(1), &mut ctx, true);
    ctx
}

/// Classify the region `[lo, hi]` (inclusive, ignored if `lo > hi`), where
/// `is_exterior` distinguishes the top-level exterior loop from a loop
/// closed by an enclosing pair.
fn classify_region(
    partner: &[Option<usize>],
    lo: usize,
    hi: usize,
    ctx: &mut [StructContext],
    is_exterior: bool,
) {
    if lo > hi || hi >= partner.len() {
        return;
    }

    let mut branches: Vec<(usize, usize)> = Vec::new();
    let mut k = lo;
    while k <= hi {
        match partner[k] {
            Some(l) if l > k && l <= hi => {
                branches.push((k, l));
                ctx[k] = StructContext::Stem;
                ctx[l] = StructContext::Stem;
                classify_region(partner, k + 1, l - 1, ctx, false);
                k = l + 1;
            }
            _ => {
                k += 1;
            }
        }
    }

    let bucket = if is_exterior {
        StructContext::External
    } else {
        match branches.len() {
            0 => StructContext::Hairpin,
            1 => {
                let (bl, br) = branches[0];
                let left = bl - lo;
                let right = hi - br;
                if left == 0 || right == 0 {
                    StructContext::Bulge
                } else {
                    StructContext::Interior
                }
            }
            _ => StructContext::Multiloop,
        }
    };

    for pos in lo..=hi {
        if partner[pos].is_none() {
            ctx[pos] = bucket;
        }
    }
}

/// Fold `sequence`, returning its structural profile.
///
/// Converts to the internal A/C/G/U alphabet (T is treated as U), computes
/// the banded inside/outside partition function, and splits each base's
/// probability mass between `Stem` (from the real base-pair probability
/// sum) and a single non-stem bucket chosen from a reference fold built off
/// the same matrix (spec.md §4.9).
pub fn fold(sequence: &[u8], config: &CapRConfig) -> Result<Profile, CapRError> {
    if sequence.is_empty() {
        return Err(CapRError::EmptySequence);
    }

    let mut codes = Vec::with_capacity(sequence.len());
    for (pos, &b) in sequence.iter().enumerate() {
        codes.push(tables::encode_base(b).ok_or(CapRError::InvalidBase(b, pos))?);
    }

    let n = codes.len();
    let thermo = Thermo::new(config.temperature);
    let max_span = config.max_span.max(MIN_HAIRPIN_UNPAIRED + 1);

    let tables = build_tables(&codes, &thermo, max_span);
    let z_fwd = exterior_forward(&tables);
    let z_bwd = exterior_backward(&tables);
    let z_total = z_fwd[n];

    let zob = outside_pairs(&tables, &codes, &thermo, &z_fwd, &z_bwd);

    let mut bpp = vec![vec![0.0f64; n]; n];
    if z_total > 0.0 {
        for i in 0..n {
            for j in (i + 1)..n {
                let inside = tables.zb(i, j);
                if inside <= 0.0 {
                    continue;
                }
                bpp[i][j] = (inside * zob[i][j] / z_total).clamp(0.0, 1.0);
            }
        }
    }

    let mut p_stem = vec![0.0f64; n];
    for i in 0..n {
        for j in (i + 1)..n {
            p_stem[i] += bpp[i][j];
            p_stem[j] += bpp[i][j];
        }
    }
    for p in &mut p_stem {
        *p = p.clamp(0.0, 0.999_999);
    }

    let partner = greedy_reference_fold(&bpp, n);
    let bucket = classify_unpaired(&partner, n);

    let mut probs = vec![[0.0f64; 6]; n];
    for k in 0..n {
        if partner[k].is_some() {
            probs[k][StructContext::Stem as usize] = 1.0;
        } else {
            probs[k][StructContext::Stem as usize] = p_stem[k];
            probs[k][bucket[k] as usize] = 1.0 - p_stem[k];
        }
    }

    Ok(Profile { length: n, probs })
}
