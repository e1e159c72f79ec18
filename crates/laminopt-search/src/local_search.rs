//! Hill-climbing refinement over symmetry-preserving swaps.
//!
//! The climber enumerates every left-half swap (outer two positions
//! excluded), ranks the fitness-improving ones under a grouping-first
//! lexicographic priority, and applies the best until no swap improves the
//! score or the iteration cap is hit.

use std::cmp::Ordering;

use laminopt_core::{Angle, GroupingStats, moves};
use laminopt_evaluator::{ExactScorer, Scorer};

/// Lexicographic priority of a candidate swap, highest first.
///
/// Tuple ordering is deliberately spelled out as a type with a total order:
/// breaking up length-3 runs outranks reducing the adjacent-pair count,
/// which outranks the raw deltas, which outrank the fitness itself.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SwapPriority {
    breaks_triple_run: bool,
    reduces_pairs: bool,
    triple_run_delta: i64,
    pair_delta: i64,
    score: f64,
}

impl Eq for SwapPriority {}

impl PartialOrd for SwapPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SwapPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.breaks_triple_run
            .cmp(&other.breaks_triple_run)
            .then(self.reduces_pairs.cmp(&other.reduces_pairs))
            .then(self.triple_run_delta.cmp(&other.triple_run_delta))
            .then(self.pair_delta.cmp(&other.pair_delta))
            .then(self.score.total_cmp(&other.score))
    }
}

#[expect(clippy::cast_possible_wrap)]
fn delta(before: usize, after: usize) -> i64 {
    before as i64 - after as i64
}

/// Refines `sequence` by repeated best-swap hill climbing.
///
/// Every candidate must score above zero (hard-constraint legal) and pass
/// the optional `admissible` filter; among the candidates that strictly
/// improve the fitness, the one with the highest [`SwapPriority`] is
/// applied. Stops at convergence or after `max_iterations`.
///
/// Returns the refined sequence and its exact score.
#[must_use]
pub fn hill_climb(
    sequence: &[Angle],
    scorer: &ExactScorer,
    max_iterations: usize,
    admissible: Option<&dyn Fn(&[Angle]) -> bool>,
) -> (Vec<Angle>, f64) {
    let mut current = sequence.to_vec();
    let mut current_score = scorer.score(&current);
    let mut current_stats = GroupingStats::from_sequence(&current);

    let half = current.len() / 2;
    if half <= moves::PROTECTED_OUTER {
        return (current, current_score);
    }

    for iteration in 0..max_iterations {
        let mut best: Option<(SwapPriority, usize, usize)> = None;

        for i in moves::PROTECTED_OUTER..half {
            for j in i + 1..half {
                if current[i] == current[j] {
                    continue;
                }
                moves::mirrored_swap(&mut current, i, j);

                let passes = admissible.is_none_or(|f| f(&current));
                if passes {
                    let score = scorer.score(&current);
                    if score > 0.0 && score > current_score {
                        let stats = GroupingStats::from_sequence(&current);
                        let priority = SwapPriority {
                            breaks_triple_run: stats.runs_of_3 < current_stats.runs_of_3,
                            reduces_pairs: stats.adjacent_pairs < current_stats.adjacent_pairs,
                            triple_run_delta: delta(current_stats.runs_of_3, stats.runs_of_3),
                            pair_delta: delta(current_stats.adjacent_pairs, stats.adjacent_pairs),
                            score,
                        };
                        if best.is_none_or(|(p, _, _)| priority > p) {
                            best = Some((priority, i, j));
                        }
                    }
                }

                moves::mirrored_swap(&mut current, i, j);
            }
        }

        let Some((priority, i, j)) = best else {
            log::debug!("hill climb converged after {iteration} iterations");
            break;
        };
        moves::mirrored_swap(&mut current, i, j);
        current_score = priority.score;
        current_stats = GroupingStats::from_sequence(&current);
    }

    (current, current_score)
}

#[cfg(test)]
mod tests {
    use laminopt_core::{PlyCounts, sequence};

    use super::*;

    fn seq(degrees: &[i32]) -> Vec<Angle> {
        degrees
            .iter()
            .map(|&d| Angle::from_degrees(d).unwrap())
            .collect()
    }

    #[test]
    fn test_hill_climb_never_worsens() {
        let scorer = ExactScorer::default();
        let start = seq(&[45, -45, 0, 0, 90, 45, 45, 90, 0, 0, -45, 45]);
        let start_score = scorer.score(&start);
        let (refined, score) = hill_climb(&start, &scorer, 60, None);
        assert!(score >= start_score);
        assert_eq!(
            PlyCounts::from_sequence(&refined),
            PlyCounts::from_sequence(&start)
        );
        assert!(!sequence::has_adjacent_cross_plies(&refined));
        assert!(sequence::is_mirror_symmetric(&refined));
    }

    #[test]
    fn test_hill_climb_preserves_outer_plies() {
        let scorer = ExactScorer::default();
        let start = seq(&[45, -45, 0, 90, 90, 45, 45, 90, 90, 0, -45, 45]);
        let (refined, _) = hill_climb(&start, &scorer, 60, None);
        assert_eq!(&refined[..2], &start[..2]);
        assert_eq!(&refined[10..], &start[10..]);
    }

    #[test]
    fn test_admissibility_filter_blocks_swaps() {
        let scorer = ExactScorer::default();
        let start = seq(&[45, -45, 0, 0, 90, 45, 45, 90, 0, 0, -45, 45]);
        let reject_all = |_: &[Angle]| false;
        let (refined, score) = hill_climb(&start, &scorer, 60, Some(&reject_all));
        assert_eq!(refined, start);
        assert_eq!(score, scorer.score(&start));
    }

    #[test]
    fn test_priority_ordering() {
        let base = SwapPriority {
            breaks_triple_run: false,
            reduces_pairs: false,
            triple_run_delta: 0,
            pair_delta: 0,
            score: 80.0,
        };
        let breaks_run = SwapPriority {
            breaks_triple_run: true,
            score: 70.0,
            ..base
        };
        // Breaking a triple run outranks a higher raw score.
        assert!(breaks_run > base);

        let higher_score = SwapPriority {
            score: 90.0,
            ..base
        };
        assert!(higher_score > base);
    }
}
