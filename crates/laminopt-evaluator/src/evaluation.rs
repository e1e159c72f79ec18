use serde::{Serialize, Serializer, ser::SerializeMap};

use laminopt_core::{Angle, GroupingStats, HardViolation, PlyCounts, sequence};

use crate::{
    rules,
    weights::{Rule, RuleWeights},
};

/// Maximum achievable total score with the default weight table.
pub const MAX_SCORE: f64 = 100.0;

/// Score, penalty and diagnostic text for one rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleScore {
    /// Which rule this entry belongs to.
    pub rule: Rule,
    /// The rule's weight from the active table.
    pub weight: f64,
    /// Awarded score, `max(0, weight − penalty)`. Exact float; rounding to
    /// two decimals happens only at serialization.
    pub score: f64,
    /// Penalty charged against the weight.
    pub penalty: f64,
    /// Human-readable explanation; empty when the rule is fully satisfied.
    pub reason: String,
}

/// Full per-rule breakdown of a sequence that passed the hard constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    /// Sum of the per-rule scores.
    pub total: f64,
    /// One entry per rule, in R1..R8 order.
    pub rules: [RuleScore; Rule::LEN],
}

impl ScoreBreakdown {
    /// The entry for one rule.
    #[must_use]
    pub fn rule(&self, rule: Rule) -> &RuleScore {
        &self.rules[rule.index()]
    }
}

/// Result of evaluating a sequence.
///
/// Hard-constraint violations are data, not errors: the evaluator is total.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// A hard constraint failed; total is 0 and the violation is the single
    /// diagnostic entry.
    HardFail(HardViolation),
    /// All hard constraints hold; soft rules were scored.
    Scored(ScoreBreakdown),
}

impl Evaluation {
    /// Total fitness score (0 on hard failure).
    #[must_use]
    pub fn total(&self) -> f64 {
        match self {
            Self::HardFail(_) => 0.0,
            Self::Scored(breakdown) => breakdown.total,
        }
    }

    /// Whether the sequence passed the hard constraints.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Scored(_))
    }

    /// The scored breakdown, if the sequence passed the hard constraints.
    #[must_use]
    pub fn breakdown(&self) -> Option<&ScoreBreakdown> {
        match self {
            Self::HardFail(_) => None,
            Self::Scored(breakdown) => Some(breakdown),
        }
    }
}

/// Evaluates a sequence against the hard constraints and the eight soft
/// rules.
///
/// Pure function: no mutation, no I/O, no randomness. Per-angle counts are
/// derived from the sequence itself.
#[must_use]
pub fn evaluate(sequence: &[Angle], weights: &RuleWeights) -> Evaluation {
    if let Some(violation) = sequence::hard_violation(sequence) {
        return Evaluation::HardFail(violation);
    }

    let n = sequence.len();
    let counts = PlyCounts::from_sequence(sequence);

    let penalties: [f64; Rule::LEN] = [
        rules::symmetry(sequence, weights.get(Rule::Symmetry)),
        rules::balance(&counts, weights.get(Rule::Balance)),
        rules::percentage(&counts, n, weights.get(Rule::Percentage)),
        rules::external_plies(sequence, weights.get(Rule::ExternalPlies)),
        rules::distribution(sequence, weights.get(Rule::Distribution)),
        rules::grouping(sequence, weights.get(Rule::Grouping)),
        rules::buckling(sequence, weights.get(Rule::Buckling)),
        rules::lateral_bending(sequence, weights.get(Rule::LateralBending)),
    ];

    let rules = Rule::ALL.map(|rule| {
        let weight = weights.get(rule);
        let penalty = penalties[rule.index()];
        RuleScore {
            rule,
            weight,
            score: (weight - penalty).max(0.0),
            penalty,
            reason: reason_for(rule, penalty, sequence),
        }
    });
    let total = rules.iter().map(|r| r.score).sum();

    Evaluation::Scored(ScoreBreakdown { total, rules })
}

fn reason_for(rule: Rule, penalty: f64, sequence: &[Angle]) -> String {
    if penalty <= 0.0 {
        return String::new();
    }
    match rule {
        Rule::Symmetry => "asymmetric mirror pairs".to_owned(),
        Rule::Balance => "+45/-45 counts unbalanced".to_owned(),
        Rule::Percentage => "angle share outside 8-67%".to_owned(),
        Rule::ExternalPlies => "outer ply pair repeats one sign".to_owned(),
        Rule::Distribution => "uneven angle distribution".to_owned(),
        Rule::Grouping => {
            let stats = GroupingStats::from_sequence(sequence);
            format!(
                "runs of 2: {}, runs of 3: {}, runs of 4+: {}",
                stats.runs_of_2, stats.runs_of_3, stats.runs_of_4_plus
            )
        }
        Rule::Buckling => "±45 close to mid-plane".to_owned(),
        Rule::LateralBending => "90° close to mid-plane".to_owned(),
    }
}

/// Synthetic breakdown key for a hard violation, mirroring the rule ids.
fn violation_code(violation: &HardViolation) -> &'static str {
    match violation {
        HardViolation::EmptySequence => "EMPTY",
        HardViolation::ZeroDegreeEndpoint { .. } => "EXTERNAL_0",
        HardViolation::CrossPlyAdjacency { .. } => "ADJ_0_90",
        HardViolation::OuterPlyNotDiagonal { .. } => "EXTERNAL_45",
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Serialize)]
struct RuleScoreRepr<'a> {
    weight: f64,
    score: f64,
    penalty: f64,
    reason: &'a str,
}

/// Report form: `{"total_score", "max_score", "rules": {"R1": {...}, ...}}`,
/// with scores rounded to two decimals. Hard failures serialize a single
/// synthetic entry (`EXTERNAL_0`, `ADJ_0_90` or `EXTERNAL_45`) with weight
/// and penalty 999.
impl Serialize for Evaluation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("total_score", &round2(self.total()))?;
        map.serialize_entry("max_score", &MAX_SCORE)?;
        match self {
            Self::HardFail(violation) => {
                let reason = violation.to_string();
                let entry = RuleScoreRepr {
                    weight: 999.0,
                    score: 0.0,
                    penalty: 999.0,
                    reason: &reason,
                };
                let rules = std::iter::once((violation_code(violation), entry))
                    .collect::<std::collections::BTreeMap<_, _>>();
                map.serialize_entry("rules", &rules)?;
            }
            Self::Scored(breakdown) => {
                let rules = breakdown
                    .rules
                    .iter()
                    .map(|r| {
                        (
                            r.rule.id(),
                            RuleScoreRepr {
                                weight: r.weight,
                                score: round2(r.score),
                                penalty: round2(r.penalty),
                                reason: &r.reason,
                            },
                        )
                    })
                    .collect::<std::collections::BTreeMap<_, _>>();
                map.serialize_entry("rules", &rules)?;
            }
        }
        map.end()
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

    fn weights() -> RuleWeights {
        RuleWeights::DEFAULT
    }

    #[test]
    fn test_zero_endpoint_hard_fails() {
        let eval = evaluate(&seq(&[0, 45, -45, 45]), &weights());
        assert_eq!(eval.total(), 0.0);
        assert!(!eval.is_valid());
    }

    #[test]
    fn test_cross_adjacency_hard_fails() {
        let eval = evaluate(&seq(&[45, -45, 0, 90, -45, 45]), &weights());
        assert_eq!(eval.total(), 0.0);
    }

    #[test]
    fn test_non_diagonal_outer_ply_hard_fails() {
        let eval = evaluate(&seq(&[45, 90, 0, 45, 90, 45]), &weights());
        assert_eq!(eval.total(), 0.0);
    }

    #[test]
    fn test_scores_are_consistent() {
        let s = seq(&[45, -45, 0, 45, 90, 45, 45, 90, 45, 0, -45, 45]);
        let eval = evaluate(&s, &weights());
        let breakdown = eval.breakdown().expect("sequence is hard-legal");

        assert!(eval.total() > 0.0);
        assert!(eval.total() <= MAX_SCORE);
        let sum: f64 = breakdown.rules.iter().map(|r| r.score).sum();
        assert!((sum - breakdown.total).abs() < 1e-9);
        for rule_score in &breakdown.rules {
            assert!(rule_score.score >= 0.0);
            assert!(rule_score.score <= rule_score.weight + 1e-9);
            if rule_score.score < rule_score.weight {
                assert!(
                    (rule_score.penalty - (rule_score.weight - rule_score.score)).abs() < 1e-9
                );
            }
        }
    }

    #[test]
    fn test_perfectly_symmetric_sequence_scores_full_symmetry() {
        let s = seq(&[45, -45, 90, 45, 0, 0, 45, 90, -45, 45]);
        let eval = evaluate(&s, &weights());
        let breakdown = eval.breakdown().unwrap();
        let r1 = breakdown.rule(Rule::Symmetry);
        assert!((r1.score - r1.weight).abs() < 1e-9);
        assert!(r1.reason.is_empty());
    }

    #[test]
    fn test_single_sign_diagonals_forfeit_balance() {
        // Five +45, zero −45: the gap saturates R2.
        let s = seq(&[45, 45, 0, 45, 90, 90, 45, 45]);
        let eval = evaluate(&s, &weights());
        let r2 = eval.breakdown().unwrap().rule(Rule::Balance).clone();
        assert!((r2.penalty - r2.weight).abs() < 1e-9);
        assert_eq!(r2.score, 0.0);
    }

    #[test]
    fn test_long_run_charges_grouping() {
        let s = seq(&[45, -45, 0, 0, 0, 0, 0, 0, -45, 45]);
        let eval = evaluate(&s, &weights());
        let r6 = eval.breakdown().unwrap().rule(Rule::Grouping).clone();
        // Run of 6 plus the pair-ratio term saturates the rule.
        assert!((r6.penalty - r6.weight).abs() < 1e-9);
        assert!(r6.reason.contains("runs of 4+: 1"));
    }

    #[test]
    fn test_mid_plane_ninety_floors_lateral_bending() {
        // Single 90° exactly on the mid-plane of 9 plies.
        let s = seq(&[45, -45, 0, 45, 90, 45, 0, -45, 45]);
        let eval = evaluate(&s, &weights());
        let r8 = eval.breakdown().unwrap().rule(Rule::LateralBending).clone();
        assert!(r8.penalty >= r8.weight * 0.85 - 1e-9);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let s = seq(&[45, -45, 0, 45, 90, 45, 45, 90, 45, 0, -45, 45]);
        assert_eq!(evaluate(&s, &weights()), evaluate(&s, &weights()));
    }

    #[test]
    fn test_report_serialization_shape() {
        let s = seq(&[45, -45, 0, 45, 90, 45, 45, 90, 45, 0, -45, 45]);
        let json = serde_json::to_value(evaluate(&s, &weights())).unwrap();
        assert_eq!(json["max_score"], 100.0);
        assert_eq!(json["rules"]["R1"]["weight"], 18.0);
        assert!(json["rules"]["R6"].get("penalty").is_some());

        let fail = serde_json::to_value(evaluate(&seq(&[0, 45, -45, 45]), &weights())).unwrap();
        assert_eq!(fail["total_score"], 0.0);
        assert_eq!(fail["rules"]["EXTERNAL_0"]["weight"], 999.0);
    }

    #[test]
    fn test_custom_weight_table_caps_total() {
        let mut custom = RuleWeights::DEFAULT;
        custom.set(Rule::Grouping, 0.0);
        let s = seq(&[45, -45, 90, 45, 0, 0, 45, 90, -45, 45]);
        let eval = evaluate(&s, &custom);
        let r6 = eval.breakdown().unwrap().rule(Rule::Grouping).clone();
        assert_eq!(r6.score, 0.0);
        assert_eq!(r6.weight, 0.0);
        assert!(eval.total() <= custom.total() + 1e-9);
    }
}
