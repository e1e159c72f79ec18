//! Penalty formulas for the eight soft lamination rules.
//!
//! Each function returns the penalty charged against the rule's weight,
//! already capped at that weight where the rule specifies a cap. The caller
//! turns penalties into scores via `score = max(0, weight − penalty)`.

use laminopt_core::{Angle, GroupingStats, PlyCounts};
use laminopt_stats::DescriptiveStats;

/// Lower/upper bounds of the per-angle share rule (R3).
const PERCENTAGE_RANGE: (f64, f64) = (0.08, 0.67);
/// Normalized mid-plane distance below which ±45° plies are penalized (R7).
const BUCKLING_CENTER_ZONE: f64 = 0.15;
/// Normalized mid-plane distance below which 90° plies are penalized (R8).
const LATERAL_BENDING_THRESHOLD: f64 = 0.20;
/// Minimum span (as a fraction of the stack) an angle should cover (R5).
const TARGET_SPAN_RATIO: f64 = 0.6;

#[expect(clippy::cast_precision_loss)]
fn as_f64(value: usize) -> f64 {
    value as f64
}

fn mid_plane(n: usize) -> f64 {
    (as_f64(n) - 1.0) / 2.0
}

/// Normalized distance of `position` from the mid-plane, in \[0, 1\].
fn mid_distance(position: usize, n: usize) -> f64 {
    let mid = mid_plane(n);
    (as_f64(position) - mid).abs() / mid.max(1.0)
}

/// R1 — symmetry. Each mismatched mirror pair is weighted by its normalized
/// distance from the mid-plane, so surface asymmetry costs more than
/// asymmetry near the neutral axis.
pub(crate) fn symmetry(sequence: &[Angle], weight: f64) -> f64 {
    let n = sequence.len();
    let mut penalty = 0.0;
    for i in 0..n / 2 {
        if sequence[i] != sequence[n - 1 - i] {
            penalty += weight * mid_distance(i, n);
        }
    }
    penalty.min(weight)
}

/// R2 — ±45 balance. The count gap is normalized by half the diagonal total.
pub(crate) fn balance(counts: &PlyCounts, weight: f64) -> f64 {
    let plus = counts.get(Angle::Plus45);
    let minus = counts.get(Angle::Minus45);
    if plus + minus == 0 {
        return 0.0;
    }
    let diff = as_f64(plus.abs_diff(minus));
    let half_total = as_f64(((plus + minus) / 2).max(1));
    weight * (diff / half_total).min(1.0)
}

/// R3 — percentage rule. Every angle outside the 8–67% share band costs a
/// quarter of the weight.
pub(crate) fn percentage(counts: &PlyCounts, n: usize, weight: f64) -> f64 {
    let per_violation = weight / 4.0;
    let mut penalty = 0.0;
    for (_, count) in counts.iter() {
        let ratio = if n > 0 { as_f64(count) / as_f64(n) } else { 0.0 };
        if ratio < PERCENTAGE_RANGE.0 || ratio > PERCENTAGE_RANGE.1 {
            penalty += per_violation;
        }
    }
    penalty.min(weight)
}

/// R4 — external ply quality. The hard constraint already forces ±45° on the
/// outer four positions; repeating the same sign within an outer pair costs
/// 15% of the weight per face.
pub(crate) fn external_plies(sequence: &[Angle], weight: f64) -> f64 {
    let n = sequence.len();
    if n < 2 {
        return 0.0;
    }
    let mut penalty = 0.0;
    if sequence[0] == sequence[1] {
        penalty += weight * 0.15;
    }
    if sequence[n - 2] == sequence[n - 1] {
        penalty += weight * 0.15;
    }
    penalty
}

/// R5 — distribution. Two components per angle (60/40): spread of the gaps
/// between consecutive plies of that angle, normalized by the ideal spacing,
/// and a clustering deficit when the angle's first-to-last span covers less
/// than 60% of the stack.
pub(crate) fn distribution(sequence: &[Angle], weight: f64) -> f64 {
    let n = sequence.len();
    let per_angle = weight / 4.0;
    let mut penalty = 0.0;

    for angle in Angle::ALL {
        let indices: Vec<usize> = (0..n).filter(|&i| sequence[i] == angle).collect();
        if indices.len() < 2 {
            continue;
        }

        let gaps = indices.windows(2).map(|w| as_f64(w[1] - w[0]));
        if let Some(stats) = DescriptiveStats::new(gaps) {
            let ideal_spacing = as_f64(n) / as_f64(indices.len());
            let normalized_std = (stats.std_dev / ideal_spacing.max(1.0)).min(1.0);
            penalty += normalized_std * per_angle * 0.6;
        }

        let span = as_f64(indices[indices.len() - 1] - indices[0]);
        let span_ratio = span / as_f64((n - 1).max(1));
        if span_ratio < TARGET_SPAN_RATIO {
            let clustering = (TARGET_SPAN_RATIO - span_ratio) / TARGET_SPAN_RATIO;
            penalty += clustering * per_angle * 0.4;
        }
    }

    penalty.min(weight)
}

/// R6 — grouping. Runs beyond three plies, runs of exactly three, 0°/90°
/// doubling, and the overall adjacent-pair ratio all accumulate.
pub(crate) fn grouping(sequence: &[Angle], weight: f64) -> f64 {
    let n = sequence.len();
    let stats = GroupingStats::from_sequence(sequence);
    let cross_pairs = sequence
        .windows(2)
        .filter(|pair| pair[0] == pair[1] && pair[0].is_cross())
        .count();

    let mut penalty = 0.0;
    if stats.max_run > 3 {
        penalty += as_f64(stats.max_run - 3) * weight * 0.35;
    }
    penalty += as_f64(stats.runs_of_3) * 2.0;
    penalty += as_f64(cross_pairs) * 0.3;
    if n > 1 {
        penalty += as_f64(stats.adjacent_pairs) / as_f64(n - 1) * weight * 0.50;
    }
    penalty.min(weight)
}

/// R7 — buckling. ±45° plies inside the innermost 15% of the stack are
/// softly penalized; the sum is normalized by the diagonal ply count.
pub(crate) fn buckling(sequence: &[Angle], weight: f64) -> f64 {
    let n = sequence.len();
    let mut diagonal_count = 0usize;
    let mut penalty_sum = 0.0;
    for (i, angle) in sequence.iter().enumerate() {
        if !angle.is_diagonal() {
            continue;
        }
        diagonal_count += 1;
        let dist = mid_distance(i, n);
        if dist < BUCKLING_CENTER_ZONE {
            let proximity = (BUCKLING_CENTER_ZONE - dist) / BUCKLING_CENTER_ZONE;
            penalty_sum += proximity.sqrt() * 0.5;
        }
    }
    if diagonal_count == 0 {
        return 0.0;
    }
    (penalty_sum / as_f64(diagonal_count) * weight).min(weight)
}

/// R8 — lateral bending. 90° plies near the mid-plane are aggressively
/// penalized; any hit inside the threshold floors the penalty at 85% of the
/// weight, two or more at 95%.
pub(crate) fn lateral_bending(sequence: &[Angle], weight: f64) -> f64 {
    let n = sequence.len();
    let mut ninety_count = 0usize;
    let mut center_hits = 0usize;
    let mut penalty_sum = 0.0;
    for (i, angle) in sequence.iter().enumerate() {
        if *angle != Angle::Ninety {
            continue;
        }
        ninety_count += 1;
        let dist = mid_distance(i, n);
        if dist < LATERAL_BENDING_THRESHOLD {
            let proximity = (LATERAL_BENDING_THRESHOLD - dist) / LATERAL_BENDING_THRESHOLD;
            penalty_sum += proximity.powf(0.4) * 1.5;
            center_hits += 1;
        }
    }
    if ninety_count == 0 {
        return 0.0;
    }
    let mut penalty = penalty_sum / as_f64(ninety_count) * weight;
    if center_hits >= 2 {
        penalty = penalty.max(weight * 0.95);
    } else if center_hits == 1 {
        penalty = penalty.max(weight * 0.85);
    }
    penalty.min(weight)
}
