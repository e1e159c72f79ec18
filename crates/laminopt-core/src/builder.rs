//! Construction of mirror-symmetric seed sequences.
//!
//! The builder produces sequences that already satisfy the hard constraints,
//! giving the search phases a legal starting point. Per-angle counts are
//! split in half between the two faces; odd remainders form a small centre
//! block straddling the mid-plane (the only positions where perfect mirror
//! symmetry is arithmetically impossible).

use arrayvec::ArrayVec;
use rand::{Rng, seq::SliceRandom};

use crate::{Angle, PlyCounts, sequence};

/// Fraction of the greedy fill region, nearest the mid-plane, where 90°
/// plies are not placed. Keeps 90° away from the neutral axis, where it
/// contributes least bending stiffness.
const INNER_NINETY_EXCLUSION: f64 = 0.20;

/// Builds a mirror-symmetric sequence realizing the given counts.
///
/// Construction:
///
/// 1. Split every count in half; odd remainders become the centre block,
///    ordered so 0° and 90° never touch.
/// 2. Fill the two outermost positions with ±45° from the half stock,
///    preferring an alternation when both signs are available.
/// 3. Place the remaining half stock greedily: no 0°/90° pair, no run of
///    three, no 90° in the innermost fill region. When nothing qualifies the
///    first remaining ply is placed anyway, so construction always
///    terminates.
/// 4. Mirror the half onto the other face and run the swap-based adjacency
///    repair over the assembled sequence.
///
/// The result always realizes `counts` exactly. Hard-constraint quality
/// depends on the stock (four ±45° plies are needed for a legal outer
/// surface); callers validate feasibility and filter by fitness.
#[must_use]
pub fn build_symmetric_sequence<R>(counts: &PlyCounts, rng: &mut R) -> Vec<Angle>
where
    R: Rng + ?Sized,
{
    let total = counts.total();
    if total == 0 {
        return Vec::new();
    }

    let mut stock = PlyCounts::new();
    for (angle, count) in counts.iter() {
        stock.set(angle, count / 2);
    }
    // Centre block: one ply per odd-count angle, in an order that keeps the
    // cross plies separated.
    let centre: ArrayVec<Angle, { Angle::LEN }> =
        [Angle::Zero, Angle::Plus45, Angle::Ninety, Angle::Minus45]
            .into_iter()
            .filter(|&a| counts.get(a) % 2 == 1)
            .collect();

    let half_len = stock.total();
    let mut left = Vec::with_capacity(half_len);

    // Outer two positions: ±45° with preferred alternation.
    let outer: ArrayVec<Angle, 2> = {
        let plus = stock.get(Angle::Plus45);
        let minus = stock.get(Angle::Minus45);
        if plus >= 1 && minus >= 1 {
            if rng.random_bool(0.5) {
                [Angle::Plus45, Angle::Minus45].into_iter().collect()
            } else {
                [Angle::Minus45, Angle::Plus45].into_iter().collect()
            }
        } else if plus >= 2 {
            [Angle::Plus45, Angle::Plus45].into_iter().collect()
        } else if minus >= 2 {
            [Angle::Minus45, Angle::Minus45].into_iter().collect()
        } else if plus == 1 {
            [Angle::Plus45].into_iter().collect()
        } else if minus == 1 {
            [Angle::Minus45].into_iter().collect()
        } else {
            ArrayVec::new()
        }
    };
    for &angle in outer.iter().take(half_len) {
        left.push(angle);
        stock.set(angle, stock.get(angle) - 1);
    }

    // Remaining half stock, shuffled then placed greedily.
    let mut pool = Vec::with_capacity(half_len - left.len());
    for (angle, count) in stock.iter() {
        pool.extend(std::iter::repeat_n(angle, count));
    }
    pool.shuffle(rng);

    let region_len = pool.len();
    #[expect(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let forbidden_start = (region_len as f64 * (1.0 - INNER_NINETY_EXCLUSION)) as usize;
    let outer_len = left.len();

    while !pool.is_empty() {
        let pos = left.len() - outer_len;
        let last = left.last().copied();
        let second_last = (left.len() >= 2).then(|| left[left.len() - 2]);
        let chosen = pool
            .iter()
            .position(|&candidate| {
                if candidate == Angle::Ninety && pos >= forbidden_start {
                    return false;
                }
                if let Some(last) = last {
                    if sequence::is_cross_pair(last, candidate) {
                        return false;
                    }
                    if second_last == Some(last) && candidate == last {
                        return false;
                    }
                }
                true
            })
            .unwrap_or(0);
        left.push(pool.remove(chosen));
    }

    let mut result = Vec::with_capacity(total);
    result.extend_from_slice(&left);
    result.extend(centre.iter().copied());
    result.extend(left.iter().rev().copied());

    fix_cross_ply_adjacency(&mut result, rng);

    debug_assert_eq!(PlyCounts::from_sequence(&result), *counts);
    result
}

/// Removes 0°/90° adjacencies by swapping the right ply of each offending
/// pair with another position.
///
/// A swap is kept only when neither swapped position ends up in a new
/// 0°/90° pair; otherwise it is rolled back and the next candidate position
/// is tried. Returns `true` when the sequence ends up free of cross-ply
/// adjacencies.
pub fn fix_cross_ply_adjacency<R>(sequence: &mut [Angle], rng: &mut R) -> bool
where
    R: Rng + ?Sized,
{
    let n = sequence.len();
    if n < 2 {
        return true;
    }

    let mut candidates: Vec<usize> = (0..n).collect();
    for _ in 0..n * 3 {
        let Some(i) = sequence::first_cross_adjacency(sequence) else {
            return true;
        };
        candidates.shuffle(rng);
        let mut swapped = false;
        for &j in &candidates {
            if j == i || j == i + 1 {
                continue;
            }
            sequence.swap(i + 1, j);
            if cross_ok_around(sequence, i + 1) && cross_ok_around(sequence, j) {
                swapped = true;
                break;
            }
            sequence.swap(i + 1, j);
        }
        if !swapped {
            // No position can absorb the ply; leave the violation for the
            // fitness filter to reject.
            return false;
        }
    }
    !sequence::has_adjacent_cross_plies(sequence)
}

fn cross_ok_around(sequence: &[Angle], index: usize) -> bool {
    let n = sequence.len();
    (index == 0 || !sequence::is_cross_pair(sequence[index - 1], sequence[index]))
        && (index + 1 >= n || !sequence::is_cross_pair(sequence[index], sequence[index + 1]))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg64;

    use super::*;

    fn counts(zero: usize, ninety: usize, plus: usize, minus: usize) -> PlyCounts {
        PlyCounts::from_pairs([
            (Angle::Zero, zero),
            (Angle::Ninety, ninety),
            (Angle::Plus45, plus),
            (Angle::Minus45, minus),
        ])
    }

    #[test]
    fn test_even_counts_build_symmetric_legal_sequences() {
        let counts = counts(12, 8, 8, 8);
        for seed in 0..20 {
            let mut rng = Pcg64::seed_from_u64(seed);
            let seq = build_symmetric_sequence(&counts, &mut rng);
            assert_eq!(seq.len(), 36);
            assert_eq!(PlyCounts::from_sequence(&seq), counts);
            assert_eq!(sequence::hard_violation(&seq), None, "seed {seed}: {seq:?}");
            assert!(sequence::is_mirror_symmetric(&seq), "seed {seed}: {seq:?}");
        }
    }

    #[test]
    fn test_odd_total_places_middle_ply() {
        let counts = counts(5, 4, 4, 4);
        let mut rng = Pcg64::seed_from_u64(7);
        let seq = build_symmetric_sequence(&counts, &mut rng);
        assert_eq!(seq.len(), 17);
        assert_eq!(PlyCounts::from_sequence(&seq), counts);
        // The single odd-count angle sits exactly on the mid-plane.
        assert_eq!(seq[8], Angle::Zero);
    }

    #[test]
    fn test_two_odd_angles_form_centre_block() {
        // Even total with odd ±45 counts: symmetry is impossible everywhere,
        // so the two leftover plies straddle the mid-plane.
        let counts = counts(8, 8, 7, 7);
        for seed in 0..20 {
            let mut rng = Pcg64::seed_from_u64(seed);
            let seq = build_symmetric_sequence(&counts, &mut rng);
            assert_eq!(seq.len(), 30);
            assert_eq!(PlyCounts::from_sequence(&seq), counts);
            assert_eq!(sequence::hard_violation(&seq), None, "seed {seed}: {seq:?}");
        }
    }

    #[test]
    fn test_construction_is_deterministic_per_seed() {
        let counts = counts(12, 8, 8, 8);
        let a = build_symmetric_sequence(&counts, &mut Pcg64::seed_from_u64(42));
        let b = build_symmetric_sequence(&counts, &mut Pcg64::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_repair_clears_isolated_cross_adjacency() {
        let mut seq: Vec<Angle> = [45, -45, 0, 90, 45, -45, 0, -45, 45]
            .iter()
            .map(|&d| Angle::from_degrees(d).unwrap())
            .collect();
        let mut rng = Pcg64::seed_from_u64(1);
        assert!(fix_cross_ply_adjacency(&mut seq, &mut rng));
        assert!(!sequence::has_adjacent_cross_plies(&seq));
        // Repair permutes, never changes the multiset.
        assert_eq!(
            PlyCounts::from_sequence(&seq),
            counts(2, 1, 3, 3)
        );
    }

    #[test]
    fn test_empty_counts_build_empty_sequence() {
        let mut rng = Pcg64::seed_from_u64(0);
        assert!(build_symmetric_sequence(&PlyCounts::new(), &mut rng).is_empty());
    }
}
