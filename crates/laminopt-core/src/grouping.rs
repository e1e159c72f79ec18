use crate::Angle;

/// Run statistics for a stacking sequence.
///
/// A run is a maximal span of identical adjacent plies. Long runs are
/// penalized by the grouping rule and several drop-off filters, so the
/// interesting numbers are the run-length histogram and the adjacent-pair
/// total (each run of length `L` contributes `L − 1` pairs).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GroupingStats {
    /// Total adjacent identical pairs across all runs.
    pub adjacent_pairs: usize,
    /// Number of runs with length ≥ 2.
    pub runs: usize,
    /// Runs of exactly length 2.
    pub runs_of_2: usize,
    /// Runs of exactly length 3.
    pub runs_of_3: usize,
    /// Runs of length 4 or more.
    pub runs_of_4_plus: usize,
    /// Longest run in the sequence.
    pub max_run: usize,
}

impl GroupingStats {
    /// Computes the statistics in a single pass.
    #[must_use]
    pub fn from_sequence(sequence: &[Angle]) -> Self {
        let mut stats = Self::default();
        if sequence.is_empty() {
            return stats;
        }

        stats.max_run = 1;
        let mut run_len = 1;
        for i in 1..sequence.len() {
            if sequence[i] == sequence[i - 1] {
                run_len += 1;
            } else {
                stats.close_run(run_len);
                run_len = 1;
            }
        }
        stats.close_run(run_len);
        stats
    }

    fn close_run(&mut self, run_len: usize) {
        if run_len >= 2 {
            self.runs += 1;
            self.adjacent_pairs += run_len - 1;
            match run_len {
                2 => self.runs_of_2 += 1,
                3 => self.runs_of_3 += 1,
                _ => self.runs_of_4_plus += 1,
            }
        }
        self.max_run = self.max_run.max(run_len);
    }
}

/// Total adjacent identical pairs, without the full histogram.
///
/// Cheap inner-loop version used by the grouping-aware move operator.
#[must_use]
pub fn adjacent_pair_count(sequence: &[Angle]) -> usize {
    sequence.windows(2).filter(|pair| pair[0] == pair[1]).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(degrees: &[i32]) -> Vec<Angle> {
        degrees
            .iter()
            .map(|&d| Angle::from_degrees(d).unwrap())
            .collect()
    }

    #[test]
    fn test_empty_and_singleton() {
        assert_eq!(GroupingStats::from_sequence(&[]), GroupingStats::default());

        let stats = GroupingStats::from_sequence(&seq(&[45]));
        assert_eq!(stats.adjacent_pairs, 0);
        assert_eq!(stats.max_run, 1);
    }

    #[test]
    fn test_run_histogram() {
        // runs: [45 45] [0 0 0] [-45] [90 90 90 90]
        let stats = GroupingStats::from_sequence(&seq(&[45, 45, 0, 0, 0, -45, 90, 90, 90, 90]));
        assert_eq!(stats.adjacent_pairs, 1 + 2 + 3);
        assert_eq!(stats.runs, 3);
        assert_eq!(stats.runs_of_2, 1);
        assert_eq!(stats.runs_of_3, 1);
        assert_eq!(stats.runs_of_4_plus, 1);
        assert_eq!(stats.max_run, 4);
    }

    #[test]
    fn test_trailing_run_is_counted() {
        let stats = GroupingStats::from_sequence(&seq(&[45, -45, 0, 0, 0]));
        assert_eq!(stats.runs_of_3, 1);
        assert_eq!(stats.max_run, 3);
    }

    #[test]
    fn test_adjacent_pair_count_matches_stats() {
        let s = seq(&[45, 45, -45, 0, 0, 90, 90, 90]);
        assert_eq!(
            adjacent_pair_count(&s),
            GroupingStats::from_sequence(&s).adjacent_pairs
        );
    }
}
