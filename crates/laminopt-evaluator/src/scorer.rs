//! Fitness scoring behind a swappable trait.
//!
//! The search loops only need a total score, so they talk to a [`Scorer`]
//! rather than the full evaluator. Two implementations exist: the exact
//! evaluator, and a cheap linear feature model that can stand in as a
//! surrogate for most generations. The exact scorer remains authoritative —
//! optimizers re-verify surrogate-ranked winners exactly before publishing.

use std::fmt;

use laminopt_core::{Angle, GroupingStats, PlyCounts, grouping, sequence};

use crate::{
    evaluation::{Evaluation, evaluate},
    weights::RuleWeights,
};

/// Assigns a total fitness score to a sequence (higher is better).
///
/// Implementations must be thread-safe: the optimizer shares one scorer
/// across its evolutionary worker threads as a read-only resource.
pub trait Scorer: fmt::Debug + Send + Sync {
    /// Total fitness of `sequence`, in \[0, 100\].
    fn score(&self, sequence: &[Angle]) -> f64;
}

/// The authoritative scorer: full hard-constraint and rule evaluation.
#[derive(Debug, Clone, Default)]
pub struct ExactScorer {
    weights: RuleWeights,
}

impl ExactScorer {
    /// Creates an exact scorer with the given weight table.
    #[must_use]
    pub const fn new(weights: RuleWeights) -> Self {
        Self { weights }
    }

    /// The active weight table.
    #[must_use]
    pub const fn weights(&self) -> &RuleWeights {
        &self.weights
    }

    /// Full evaluation with per-rule breakdown.
    #[must_use]
    pub fn evaluate(&self, sequence: &[Angle]) -> Evaluation {
        evaluate(sequence, &self.weights)
    }
}

impl Scorer for ExactScorer {
    fn score(&self, sequence: &[Angle]) -> f64 {
        self.evaluate(sequence).total()
    }
}

const FEATURE_COUNT: usize = 6;

/// Cheap linear surrogate: `score = 100 − Σ wᵢ·fᵢ` over six normalized
/// defect features (each in \[0, 1\], higher meaning worse).
///
/// Features, in order: mirror-pair mismatch fraction, ±45 count gap,
/// adjacent-pair ratio, long-run presence, 90° mid-plane proximity
/// fraction, ±45 mid-plane proximity fraction. The default feature weights
/// are hand-calibrated against the exact rule weights and sum to 100.
///
/// Hard-constraint violations still score 0 — the constraint check is cheap
/// and keeps the surrogate from rewarding illegal stacks.
#[derive(Debug, Clone)]
pub struct LinearSurrogate {
    feature_weights: [f64; FEATURE_COUNT],
}

impl LinearSurrogate {
    /// Default feature weights, calibrated against [`RuleWeights::DEFAULT`].
    pub const DEFAULT_FEATURE_WEIGHTS: [f64; FEATURE_COUNT] =
        [18.0, 12.0, 24.0, 16.5, 17.5, 12.0];

    /// Surrogate with the default calibration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            feature_weights: Self::DEFAULT_FEATURE_WEIGHTS,
        }
    }

    /// Surrogate with custom feature weights (e.g. re-fitted offline).
    #[must_use]
    pub const fn with_feature_weights(feature_weights: [f64; FEATURE_COUNT]) -> Self {
        Self { feature_weights }
    }

    #[expect(clippy::cast_precision_loss)]
    fn features(sequence: &[Angle]) -> [f64; FEATURE_COUNT] {
        let n = sequence.len();
        if n < 2 {
            return [0.0; FEATURE_COUNT];
        }
        let nf = n as f64;
        let mid = (nf - 1.0) / 2.0;
        let counts = PlyCounts::from_sequence(sequence);

        let mismatches = (0..n / 2)
            .filter(|&i| sequence[i] != sequence[n - 1 - i])
            .count();
        let mismatch_fraction = mismatches as f64 / (nf / 2.0);

        let plus = counts.get(Angle::Plus45);
        let minus = counts.get(Angle::Minus45);
        let balance_gap = if plus + minus > 0 {
            plus.abs_diff(minus) as f64 / ((plus + minus) as f64 / 2.0).max(1.0)
        } else {
            0.0
        };

        let pair_ratio = grouping::adjacent_pair_count(sequence) as f64 / (nf - 1.0);

        let stats = GroupingStats::from_sequence(sequence);
        let long_runs = (stats.runs_of_3 as f64 * 0.5 + stats.runs_of_4_plus as f64).min(1.0);

        let near_mid = |angle_matches: &dyn Fn(Angle) -> bool, threshold: f64| {
            let mut hits = 0usize;
            let mut total = 0usize;
            for (i, &a) in sequence.iter().enumerate() {
                if !angle_matches(a) {
                    continue;
                }
                total += 1;
                if (i as f64 - mid).abs() / mid.max(1.0) < threshold {
                    hits += 1;
                }
            }
            if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            }
        };
        let ninety_near_mid = near_mid(&|a| a == Angle::Ninety, 0.20);
        let diagonal_near_mid = near_mid(&Angle::is_diagonal, 0.15);

        [
            mismatch_fraction.min(1.0),
            balance_gap.min(1.0),
            pair_ratio,
            long_runs,
            ninety_near_mid,
            diagonal_near_mid,
        ]
    }
}

impl Default for LinearSurrogate {
    fn default() -> Self {
        Self::new()
    }
}

impl Scorer for LinearSurrogate {
    fn score(&self, sequence: &[Angle]) -> f64 {
        if sequence::hard_violation(sequence).is_some() {
            return 0.0;
        }
        let features = Self::features(sequence);
        let penalty: f64 = features
            .iter()
            .zip(&self.feature_weights)
            .map(|(f, w)| f * w)
            .sum();
        (100.0 - penalty).clamp(0.0, 100.0)
    }
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
    fn test_exact_scorer_matches_evaluate() {
        let scorer = ExactScorer::default();
        let s = seq(&[45, -45, 0, 45, 90, 45, 45, 90, 45, 0, -45, 45]);
        assert_eq!(scorer.score(&s), evaluate(&s, &RuleWeights::DEFAULT).total());
    }

    #[test]
    fn test_surrogate_rejects_hard_violations() {
        let surrogate = LinearSurrogate::new();
        assert_eq!(surrogate.score(&seq(&[0, 45, -45, 45])), 0.0);
        assert_eq!(surrogate.score(&seq(&[45, -45, 0, 90, -45, 45])), 0.0);
    }

    #[test]
    fn test_surrogate_prefers_cleaner_stacks() {
        let surrogate = LinearSurrogate::new();
        // Balanced, spread, symmetric...
        let good = seq(&[45, -45, 90, 45, 0, 0, 45, 90, -45, 45]);
        // ...vs grouped, asymmetric and one-sided (still hard-legal).
        let bad = seq(&[45, 45, 45, 45, 0, 0, 45, 90, -45, 45]);
        assert!(surrogate.score(&good) > surrogate.score(&bad));
    }

    #[test]
    fn test_surrogate_range() {
        let surrogate = LinearSurrogate::new();
        let s = seq(&[45, -45, 90, 45, 0, 0, 45, 90, -45, 45]);
        let score = surrogate.score(&s);
        assert!((0.0..=100.0).contains(&score));
    }
}
