//! Thermodynamic constants for the CapR engine (spec.md §4.9).
//!
//! These follow the *shape* of the Turner nearest-neighbor model — stacking
//! energies classified by base-pair strength, logarithmic loop-length
//! extrapolation, and a linear multi-loop model — but the exact numeric
//! parameters are simplified placeholders rather than the full
//! length-dependent and sequence-dependent Turner 2004 tables (which run
//! to several thousand entries and are not reproduced here). See
//! `DESIGN.md` for the explicit simplification this represents.

/// Universal gas constant in kcal/(mol·K).
pub const GAS_CONSTANT: f64 = 0.0019872041;

/// Minimum number of unpaired bases inside a hairpin loop.
pub const MIN_HAIRPIN_UNPAIRED: usize = 3;

/// Boltzmann factors below this magnitude are treated as exactly zero
/// (spec.md §4.9's underflow floor).
pub const ZERO_FLOOR: f64 = 1e-300;

/// Hairpin loop initiation energy (kcal/mol) at the reference loop length.
pub const HAIRPIN_INIT_BASE: f64 = 5.5;

/// Reference loop length for [`HAIRPIN_INIT_BASE`] (Jacobson-Stockmayer
/// extrapolation uses `ln(len / HAIRPIN_REF_LEN)` beyond this length).
pub const HAIRPIN_REF_LEN: f64 = 3.0;

/// Bulge loop initiation energy (kcal/mol) at length 1.
pub const BULGE_INIT_BASE: f64 = 3.8;

/// Interior loop initiation energy (kcal/mol) at length 2.
pub const INTERIOR_INIT_BASE: f64 = 2.0;

/// Per-unit asymmetry penalty (kcal/mol) between the two interior-loop
/// side lengths, capped at [`INTERIOR_ASYMMETRY_CAP`].
pub const INTERIOR_ASYMMETRY_PENALTY: f64 = 0.3;

/// Cap on the total interior-loop asymmetry penalty (kcal/mol).
pub const INTERIOR_ASYMMETRY_CAP: f64 = 3.0;

/// Multi-loop initiation energy (kcal/mol): the `a` term of the linear
/// `a + b·branches + c·unpaired` model.
pub const MULTILOOP_INIT: f64 = 3.4;

/// Multi-loop per-branch energy (kcal/mol): the `b` term.
pub const MULTILOOP_PER_BRANCH: f64 = 0.4;

/// Multi-loop per-unpaired-base energy (kcal/mol): the `c` term.
pub const MULTILOOP_PER_UNPAIRED: f64 = 0.0;

/// Internal base alphabet: A=1, C=2, G=3, U=4 (spec.md §4.9 step 1).
pub fn encode_base(b: u8) -> Option<u8> {
    match b.to_ascii_uppercase() {
        b'A' => Some(1),
        b'C' => Some(2),
        b'G' => Some(3),
        b'U' | b'T' => Some(4),
        _ => None,
    }
}

/// Whether internal codes `a`/`b` can form a Watson-Crick or wobble pair.
pub fn can_pair(a: u8, b: u8) -> bool {
    matches!(
        (a, b),
        (1, 4) | (4, 1) | (2, 3) | (3, 2) | (3, 4) | (4, 3)
    )
}

/// Classify a pair by strength for the stacking table: 2 = GC, 1 = AU, 0 = GU
/// (wobble, weakest).
fn pair_strength(a: u8, b: u8) -> u8 {
    match (a.min(b), a.max(b)) {
        (2, 3) => 2, // C-G
        (1, 4) => 1, // A-U
        (3, 4) => 0, // G-U
        _ => 0,
    }
}

/// Stacking energy (kcal/mol, negative = favorable) between an outer pair
/// `(a,b)` and the pair immediately nested inside it `(c,d)`, classified by
/// combined pair strength.
pub fn stack_energy(a: u8, b: u8, c: u8, d: u8) -> f64 {
    let outer = pair_strength(a, b);
    let inner = pair_strength(c, d);
    match outer + inner {
        4 => -3.3, // GC stacked on GC
        3 => -2.1, // GC stacked on AU (either order)
        2 => -1.3, // AU on AU, or a GC/GU combination
        1 => -1.0, // AU on GU, or similar weak stack
        _ => -0.5, // GU on GU
    }
}
