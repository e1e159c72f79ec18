//! Local mutation operators for the search phases.
//!
//! Every operator edits the left half of the sequence (excluding the two
//! protected outer positions), mirrors the edit onto the right half, and
//! rolls the edit back if it introduces a 0°/90° adjacency. Per-angle counts
//! and mid-plane symmetry are preserved by construction; edits are in-place
//! do/undo swaps, so the inner loops never allocate.

use rand::{Rng, seq::IndexedRandom};

use crate::{Angle, grouping, sequence};

/// Outer positions on each face that move operators never touch.
///
/// The outer two plies carry the ±45° surface requirement; moving them
/// would trade a hard constraint for a soft improvement.
pub const PROTECTED_OUTER: usize = 2;

/// Swaps positions `i` and `j` together with their mirrors.
///
/// Self-inverse: applying the same swap twice restores the sequence.
/// Both indices must lie in the left half (`< n / 2`).
pub fn mirrored_swap(sequence: &mut [Angle], i: usize, j: usize) {
    let n = sequence.len();
    debug_assert!(i < n / 2 && j < n / 2);
    sequence.swap(i, j);
    sequence.swap(n - 1 - i, n - 1 - j);
}

/// Random symmetry-preserving swap. Returns whether a swap was applied.
pub fn symmetry_preserving_swap<R>(sequence: &mut [Angle], rng: &mut R) -> bool
where
    R: Rng + ?Sized,
{
    let half = sequence.len() / 2;
    if half <= PROTECTED_OUTER {
        return false;
    }
    let i = rng.random_range(PROTECTED_OUTER..half);
    let j = rng.random_range(PROTECTED_OUTER..half);
    if i == j {
        return false;
    }
    mirrored_swap(sequence, i, j);
    if sequence::has_adjacent_cross_plies(sequence) {
        mirrored_swap(sequence, i, j);
        return false;
    }
    true
}

/// Swaps a random +45° ply with a random −45° ply (mirrored).
///
/// Moving a diagonal pair redistributes the two signs without touching the
/// ±45 balance itself; useful for escaping sign clusters.
pub fn balance_swap<R>(sequence: &mut [Angle], rng: &mut R) -> bool
where
    R: Rng + ?Sized,
{
    let half = sequence.len() / 2;
    if half <= PROTECTED_OUTER {
        return false;
    }
    let plus: Vec<usize> = (PROTECTED_OUTER..half)
        .filter(|&i| sequence[i] == Angle::Plus45)
        .collect();
    let minus: Vec<usize> = (PROTECTED_OUTER..half)
        .filter(|&i| sequence[i] == Angle::Minus45)
        .collect();
    let (Some(&i), Some(&j)) = (plus.choose(rng), minus.choose(rng)) else {
        return false;
    };
    mirrored_swap(sequence, i, j);
    if sequence::has_adjacent_cross_plies(sequence) {
        mirrored_swap(sequence, i, j);
        return false;
    }
    true
}

/// Applies one randomly chosen swap from the set of symmetry-preserving
/// swaps that strictly reduce the adjacent-identical pair count.
///
/// Returns `false` when no such swap exists.
pub fn grouping_swap<R>(sequence: &mut [Angle], rng: &mut R) -> bool
where
    R: Rng + ?Sized,
{
    let half = sequence.len() / 2;
    if half <= PROTECTED_OUTER {
        return false;
    }
    let current = grouping::adjacent_pair_count(sequence);

    let mut improving = Vec::new();
    for i in PROTECTED_OUTER..half {
        for j in i + 1..half {
            if sequence[i] == sequence[j] {
                continue;
            }
            mirrored_swap(sequence, i, j);
            if grouping::adjacent_pair_count(sequence) < current
                && !sequence::has_adjacent_cross_plies(sequence)
            {
                improving.push((i, j));
            }
            mirrored_swap(sequence, i, j);
        }
    }

    let Some(&(i, j)) = improving.choose(rng) else {
        return false;
    };
    mirrored_swap(sequence, i, j);
    true
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg64;

    use crate::PlyCounts;

    use super::*;

    fn seq(degrees: &[i32]) -> Vec<Angle> {
        degrees
            .iter()
            .map(|&d| Angle::from_degrees(d).unwrap())
            .collect()
    }

    #[test]
    fn test_mirrored_swap_is_self_inverse() {
        let original = seq(&[45, -45, 0, 90, 45, 45, 90, 0, -45, 45]);
        let mut s = original.clone();
        mirrored_swap(&mut s, 2, 4);
        assert_ne!(s, original);
        mirrored_swap(&mut s, 2, 4);
        assert_eq!(s, original);
    }

    #[test]
    fn test_symmetry_preserving_swap_invariants() {
        let original = seq(&[45, -45, 0, 0, 90, 45, 45, 90, 0, 0, -45, 45]);
        let counts = PlyCounts::from_sequence(&original);
        let mut rng = Pcg64::seed_from_u64(3);

        let mut s = original.clone();
        let mut applied = 0;
        for _ in 0..50 {
            if symmetry_preserving_swap(&mut s, &mut rng) {
                applied += 1;
            }
            assert_eq!(PlyCounts::from_sequence(&s), counts);
            assert!(sequence::is_mirror_symmetric(&s));
            assert!(!sequence::has_adjacent_cross_plies(&s));
            // Protected outer plies never move.
            assert_eq!(&s[..2], &original[..2]);
            assert_eq!(&s[10..], &original[10..]);
        }
        assert!(applied > 0);
    }

    #[test]
    fn test_balance_swap_preserves_counts() {
        let original = seq(&[45, -45, 45, 0, -45, -45, 0, 45, -45, 45]);
        let counts = PlyCounts::from_sequence(&original);
        let mut rng = Pcg64::seed_from_u64(11);

        let mut s = original.clone();
        for _ in 0..20 {
            balance_swap(&mut s, &mut rng);
            assert_eq!(PlyCounts::from_sequence(&s), counts);
            assert!(!sequence::has_adjacent_cross_plies(&s));
        }
    }

    #[test]
    fn test_balance_swap_requires_both_signs() {
        // Left half interior holds only +45; no move available.
        let mut s = seq(&[45, -45, 45, 45, 45, 45, -45, 45]);
        let before = s.clone();
        let mut rng = Pcg64::seed_from_u64(0);
        assert!(!balance_swap(&mut s, &mut rng));
        assert_eq!(s, before);
    }

    #[test]
    fn test_grouping_swap_strictly_reduces_pairs() {
        // [45, -45, 0, 0, 45, | mirror] has a 0-0 pair in each half that a
        // swap with the interior 45 can break.
        let mut s = seq(&[45, -45, 0, 0, 45, 45, 0, 0, -45, 45]);
        let before_pairs = grouping::adjacent_pair_count(&s);
        let mut rng = Pcg64::seed_from_u64(5);
        if grouping_swap(&mut s, &mut rng) {
            assert!(grouping::adjacent_pair_count(&s) < before_pairs);
            assert!(sequence::is_mirror_symmetric(&s));
        }
    }

    #[test]
    fn test_grouping_swap_reports_no_improvement() {
        // Already pair-free: no swap can improve.
        let mut s = seq(&[45, -45, 0, 45, 90, 90, 45, 0, -45, 45]);
        let before = s.clone();
        let mut rng = Pcg64::seed_from_u64(9);
        // 90-90 pair spans the mid-plane; breaking it requires moving a
        // mirrored pair, which the operator cannot improve on here.
        let improved = grouping_swap(&mut s, &mut rng);
        if !improved {
            assert_eq!(s, before);
        }
    }

    #[test]
    fn test_operators_no_op_on_tiny_sequences() {
        let mut s = seq(&[45, -45, -45, 45]);
        let mut rng = Pcg64::seed_from_u64(1);
        assert!(!symmetry_preserving_swap(&mut s, &mut rng));
        assert!(!balance_swap(&mut s, &mut rng));
        assert!(!grouping_swap(&mut s, &mut rng));
    }
}
