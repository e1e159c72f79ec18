//! Structural predicates over stacking sequences.
//!
//! The hard manufacturing constraints live here so that construction, search
//! and evaluation all agree on what a legal sequence is:
//!
//! 1. Neither endpoint ply is 0°.
//! 2. No 0° ply sits next to a 90° ply anywhere in the stack.
//! 3. For sequences of four or more plies, the outer two plies on each face
//!    are ±45°.

use crate::Angle;

/// Hard manufacturing constraint violated by a sequence.
///
/// Violations are data, not panics: the evaluator maps them to a zero-score
/// diagnostic entry rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum HardViolation {
    /// The sequence contains no plies at all.
    #[display("sequence is empty")]
    EmptySequence,
    /// A 0° ply occupies the first or last position.
    #[display("0° ply at endpoint position {position}")]
    ZeroDegreeEndpoint {
        /// Offending index (0 or n−1).
        position: usize,
    },
    /// A 0° ply and a 90° ply are adjacent.
    #[display("0°/90° adjacency at positions {index}/{}", index + 1)]
    CrossPlyAdjacency {
        /// Index of the left ply of the offending pair.
        index: usize,
    },
    /// One of the outer four plies is not ±45°.
    #[display("outer ply at position {position} is {found}, expected ±45°")]
    OuterPlyNotDiagonal {
        /// Offending index (one of 0, 1, n−2, n−1).
        position: usize,
        /// Angle actually found there.
        found: Angle,
    },
}

/// Whether two plies form a forbidden 0°/90° pair.
#[inline]
#[must_use]
pub fn is_cross_pair(a: Angle, b: Angle) -> bool {
    (a == Angle::Zero && b == Angle::Ninety) || (a == Angle::Ninety && b == Angle::Zero)
}

/// Index of the first 0°/90° adjacency, if any.
#[must_use]
pub fn first_cross_adjacency(sequence: &[Angle]) -> Option<usize> {
    sequence
        .windows(2)
        .position(|pair| is_cross_pair(pair[0], pair[1]))
}

/// Whether the sequence contains any 0°/90° adjacency.
#[inline]
#[must_use]
pub fn has_adjacent_cross_plies(sequence: &[Angle]) -> bool {
    first_cross_adjacency(sequence).is_some()
}

/// Whether the sequence reads the same from both faces.
#[must_use]
pub fn is_mirror_symmetric(sequence: &[Angle]) -> bool {
    let n = sequence.len();
    (0..n / 2).all(|i| sequence[i] == sequence[n - 1 - i])
}

/// Whether the outer two plies on each face are all ±45°.
///
/// Vacuously true for sequences shorter than four plies; the outer-ply rule
/// only binds from four plies up.
#[must_use]
pub fn outer_plies_are_diagonal(sequence: &[Angle]) -> bool {
    let n = sequence.len();
    if n < 4 {
        return true;
    }
    [0, 1, n - 2, n - 1]
        .iter()
        .all(|&i| sequence[i].is_diagonal())
}

/// Checks the hard constraints in evaluation order.
///
/// Returns the first violation found: endpoint 0° first, then 0°/90°
/// adjacency, then the outer-ply rule.
#[must_use]
pub fn hard_violation(sequence: &[Angle]) -> Option<HardViolation> {
    let n = sequence.len();
    if n == 0 {
        return Some(HardViolation::EmptySequence);
    }
    if sequence[0] == Angle::Zero {
        return Some(HardViolation::ZeroDegreeEndpoint { position: 0 });
    }
    if sequence[n - 1] == Angle::Zero {
        return Some(HardViolation::ZeroDegreeEndpoint { position: n - 1 });
    }
    if let Some(index) = first_cross_adjacency(sequence) {
        return Some(HardViolation::CrossPlyAdjacency { index });
    }
    if n >= 4 {
        for position in [0, 1, n - 2, n - 1] {
            let found = sequence[position];
            if !found.is_diagonal() {
                return Some(HardViolation::OuterPlyNotDiagonal { position, found });
            }
        }
    }
    None
}
