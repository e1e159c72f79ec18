//! The multi-zone orchestrator.

use std::fmt;
use std::sync::{Arc, atomic::AtomicBool, atomic::Ordering};

use rand::Rng as _;
use serde::Serialize;

use laminopt_core::{Angle, PlyCounts};
use laminopt_evaluator::{Evaluation, ExactScorer, RuleWeights, Scorer};
use laminopt_search::{
    DropOffEngine, DropRecord, OptimizerConfig, StackingOptimizer, hill_climb,
};

use crate::{
    geometry::{PanelGeometry, Rect},
    graph::{BfsSchedule, bfs_schedule, build_neighbor_graph},
    progress::{ProgressEvent, ProgressSink},
};

/// Default physical panel length the pixel extent maps to.
pub const DEFAULT_PANEL_LENGTH_MM: f64 = 300.0;
/// Cured ply thickness.
pub const PLY_THICKNESS_MM: f64 = 0.125;
/// Laminate density.
pub const DENSITY_G_PER_MM3: f64 = 1.58e-3;
/// Horizontal distance required per dropped ply.
pub const RAMP_RATE_MM_PER_PLY: f64 = 0.5;
/// Root re-optimization attempts before giving up.
pub const MAX_ROOT_RETRIES: usize = 5;
/// Hill-climb iterations spent polishing each derived zone.
const CHILD_POLISH_ITERS: usize = 25;

/// A multi-zone optimization request.
#[derive(Debug)]
pub struct PanelRequest {
    /// Per-zone ply counts; at least two zones.
    pub zones: Vec<PlyCounts>,
    /// Optional zone rectangles, one per zone, in pixel coordinates.
    pub bounds: Option<Vec<Rect>>,
    /// Physical length the pixel bounding extent maps to.
    pub panel_length_mm: f64,
    /// Rule weight table shared by every scoring path.
    pub weights: RuleWeights,
    /// Optional surrogate accelerator for the root search.
    pub surrogate: Option<Arc<dyn Scorer>>,
    /// Base seed; `None` draws one from the OS.
    pub seed: Option<u64>,
    /// Cooperative cancellation, polled between zones and search runs.
    pub cancel: Option<Arc<AtomicBool>>,
    /// Optional progress sink.
    pub progress: Option<ProgressSink>,
}

impl PanelRequest {
    /// Request with default settings for the given zones.
    #[must_use]
    pub fn new(zones: Vec<PlyCounts>) -> Self {
        Self {
            zones,
            bounds: None,
            panel_length_mm: DEFAULT_PANEL_LENGTH_MM,
            weights: RuleWeights::DEFAULT,
            surrogate: None,
            seed: None,
            cancel: None,
            progress: None,
        }
    }
}

/// One parent/child angle-count violation found by the feasibility walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeasibilityViolation {
    /// Parent zone index.
    pub parent: usize,
    /// Child zone index.
    pub child: usize,
    /// Offending angle.
    pub angle: Angle,
    /// Count available in the parent.
    pub parent_count: usize,
    /// Count requested by the child.
    pub child_count: usize,
}

impl fmt::Display for FeasibilityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "zone {} -> zone {}: {} hedef {} ama parent'ta {} var",
            self.parent, self.child, self.angle, self.child_count, self.parent_count
        )
    }
}

/// Request rejected before optimization started.
#[derive(Debug, Clone, PartialEq, derive_more::Error)]
pub enum PanelError {
    /// A panel needs at least two zones.
    TooFewZones,
    /// `bounds` must describe exactly one rectangle per zone.
    BoundsMismatch {
        /// Zones in the request.
        zones: usize,
        /// Rectangles supplied.
        bounds: usize,
    },
    /// A zone's counts cannot produce a legal stack at all.
    UnbuildableZone {
        /// Zone index.
        zone: usize,
        /// Why the counts are unbuildable.
        source: laminopt_search::InfeasibleCountsError,
    },
    /// Some zones are unreachable from the root.
    Disconnected {
        /// Unreachable zone indices, ascending.
        disconnected: Vec<usize>,
    },
    /// Children request more plies of some angle than their parent holds.
    Infeasible {
        /// Every violating parent/child/angle triple.
        violations: Vec<FeasibilityViolation>,
    },
}

impl fmt::Display for PanelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewZones => write!(f, "En az 2 zone gerekli"),
            Self::BoundsMismatch { zones, bounds } => {
                write!(f, "bounds sayisi ({bounds}) zone sayisi ({zones}) ile uyumsuz")
            }
            Self::UnbuildableZone { zone, source } => write!(f, "Zone {zone}: {source}"),
            Self::Disconnected { disconnected } => {
                write!(f, "Baglantisiz zone'lar: ")?;
                write_indices(f, disconnected)
            }
            Self::Infeasible { violations } => {
                write!(f, "Ply sayilari uyumsuz: ")?;
                for (i, violation) in violations.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{violation}")?;
                }
                Ok(())
            }
        }
    }
}

fn write_indices(f: &mut fmt::Formatter<'_>, indices: &[usize]) -> fmt::Result {
    for (i, index) in indices.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{index}")?;
    }
    Ok(())
}

/// Final state of one zone.
#[derive(Debug, Clone, Serialize)]
pub struct ZoneResult {
    /// Zone index.
    pub index: usize,
    /// Final stacking sequence.
    pub sequence: Vec<Angle>,
    /// Sequence length.
    pub ply_count: usize,
    /// Total fitness.
    pub fitness: f64,
    /// Whether this zone is the root.
    pub is_root: bool,
    /// Per-angle counts (always equal to the request).
    pub ply_counts: PlyCounts,
    /// Full per-rule breakdown.
    pub evaluation: Evaluation,
}

/// A parent → child drop recorded during execution.
#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    /// Parent zone index.
    pub parent: usize,
    /// Child zone index.
    pub child: usize,
    /// Removed parent indices, by angle.
    pub dropped: DropRecord,
    /// All removed parent indices, ascending.
    pub dropped_indices: Vec<usize>,
}

/// Mass of one zone.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ZoneWeight {
    /// Zone index.
    pub zone: usize,
    /// Zone area (1 mm² without geometry).
    pub area_mm2: f64,
    /// Ply count.
    pub ply_count: usize,
    /// Mass in grams: area × plies × thickness × density.
    pub mass_g: f64,
}

/// Panel weight summary.
#[derive(Debug, Clone, Serialize)]
pub struct WeightReport {
    /// Whether real geometry backed the areas.
    pub has_geometry: bool,
    /// Per-zone masses.
    pub zones: Vec<ZoneWeight>,
    /// Sum of the per-zone masses.
    pub total_mass_g: f64,
}

/// Ramp feasibility of one adjacent zone pair.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RampCheck {
    /// Lower zone index of the pair.
    pub zone_a: usize,
    /// Higher zone index of the pair.
    pub zone_b: usize,
    /// Absolute ply-count difference.
    pub ply_difference: usize,
    /// Ramp length the difference requires.
    pub required_mm: f64,
    /// Edge length available to absorb the ramp.
    pub available_mm: f64,
    /// Whether the ramp fits.
    pub passes: bool,
    /// `available − required`.
    pub margin_mm: f64,
}

/// Outcome of a multi-zone optimization.
#[derive(Debug, Clone, Serialize)]
pub struct PanelResult {
    /// Whether every zone was completed.
    pub success: bool,
    /// Failure description when `success` is false.
    pub error: Option<String>,
    /// Per-zone results; `None` for zones not completed before a failure or
    /// cancellation.
    pub zones: Vec<Option<ZoneResult>>,
    /// Parent → child drops, in BFS order.
    pub transitions: Vec<Transition>,
    /// Root zone index.
    pub root_index: usize,
    /// Drop-off parent per zone (`None` for the root).
    pub dropoff_parents: Vec<Option<usize>>,
    /// Neighbour lists per zone, ascending.
    pub neighbor_graph: Vec<Vec<usize>>,
    /// Weight summary.
    pub weight: WeightReport,
    /// Ramp checks per adjacent pair (empty without geometry).
    pub ramp_checks: Vec<RampCheck>,
}

/// Runs the full multi-zone optimization.
///
/// Connectivity and feasibility problems are rejected up front as
/// [`PanelError`]s; search failure after all root retries and cancellation
/// both come back as an `Ok` result with `success = false` and the zones
/// completed so far.
pub fn optimize_panel(request: PanelRequest) -> Result<PanelResult, PanelError> {
    let zone_count = request.zones.len();
    if zone_count < 2 {
        return Err(PanelError::TooFewZones);
    }
    if let Some(bounds) = &request.bounds {
        if bounds.len() != zone_count {
            return Err(PanelError::BoundsMismatch {
                zones: zone_count,
                bounds: bounds.len(),
            });
        }
    }
    for (zone, counts) in request.zones.iter().enumerate() {
        if let Err(source) = validate_counts(counts) {
            return Err(PanelError::UnbuildableZone { zone, source });
        }
    }

    let thickness: Vec<usize> = request.zones.iter().map(PlyCounts::total).collect();
    let root = root_zone(&thickness);
    let graph = build_neighbor_graph(zone_count, request.bounds.as_deref());
    let schedule = bfs_schedule(&graph, root, &thickness);

    let disconnected = schedule.unreachable(zone_count);
    if !disconnected.is_empty() {
        return Err(PanelError::Disconnected { disconnected });
    }

    let mut violations = Vec::new();
    for &zone in &schedule.order {
        let Some(parent) = schedule.parent[zone] else {
            continue;
        };
        for (angle, child_count) in request.zones[zone].iter() {
            let parent_count = request.zones[parent].get(angle);
            if child_count > parent_count {
                violations.push(FeasibilityViolation {
                    parent,
                    child: zone,
                    angle,
                    parent_count,
                    child_count,
                });
            }
        }
    }
    if !violations.is_empty() {
        return Err(PanelError::Infeasible { violations });
    }

    let geometry = request
        .bounds
        .as_deref()
        .map(|rects| PanelGeometry::from_rects(rects, request.panel_length_mm));

    Ok(execute(&request, root, &graph, &schedule, geometry.as_ref()))
}

fn validate_counts(counts: &PlyCounts) -> Result<(), laminopt_search::InfeasibleCountsError> {
    use laminopt_search::InfeasibleCountsError;
    let total = counts.total();
    if total == 0 {
        return Err(InfeasibleCountsError::EmptyCounts);
    }
    if total >= 4 && counts.diagonal_total() < 4 {
        return Err(InfeasibleCountsError::InsufficientDiagonals {
            available: counts.diagonal_total(),
        });
    }
    Ok(())
}

fn root_zone(thickness: &[usize]) -> usize {
    let mut root = 0;
    for (zone, &plies) in thickness.iter().enumerate() {
        if plies > thickness[root] {
            root = zone;
        }
    }
    root
}

struct Run<'a> {
    request: &'a PanelRequest,
    root: usize,
    graph: &'a [Vec<usize>],
    schedule: &'a BfsSchedule,
    geometry: Option<&'a PanelGeometry>,
    scorer: ExactScorer,
    base_seed: u64,
}

fn execute(
    request: &PanelRequest,
    root: usize,
    graph: &[Vec<usize>],
    schedule: &BfsSchedule,
    geometry: Option<&PanelGeometry>,
) -> PanelResult {
    let run = Run {
        request,
        root,
        graph,
        schedule,
        geometry,
        scorer: ExactScorer::new(request.weights),
        base_seed: request.seed.unwrap_or_else(|| rand::rng().random()),
    };
    run.execute()
}

impl Run<'_> {
    fn is_cancelled(&self) -> bool {
        self.request
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn publish(&self, event: ProgressEvent) {
        if let Some(sink) = &self.request.progress {
            sink.publish(event);
        }
    }

    fn execute(&self) -> PanelResult {
        let zone_count = self.request.zones.len();
        let mut zones: Vec<Option<ZoneResult>> = vec![None; zone_count];
        let mut transitions: Vec<Transition> = Vec::new();

        for attempt in 0..MAX_ROOT_RETRIES {
            zones.iter_mut().for_each(|z| *z = None);
            transitions.clear();

            if self.is_cancelled() {
                return self.partial(zones, transitions, Some("Iptal edildi".to_owned()));
            }

            match self.attempt(attempt, &mut zones, &mut transitions) {
                AttemptOutcome::Complete => {
                    return self.complete(zones, transitions);
                }
                AttemptOutcome::Cancelled => {
                    return self.partial(zones, transitions, Some("Iptal edildi".to_owned()));
                }
                AttemptOutcome::DropOffFailed { zone } => {
                    log::warn!("attempt {attempt}: drop-off failed for zone {zone}, retrying root");
                    self.publish(ProgressEvent::RetryScheduled { attempt, zone });
                }
            }
        }

        self.partial(zones, transitions, Some("Maksimum deneme asildi".to_owned()))
    }

    fn attempt(
        &self,
        attempt: usize,
        zones: &mut [Option<ZoneResult>],
        transitions: &mut Vec<Transition>,
    ) -> AttemptOutcome {
        self.publish(ProgressEvent::RootStarted {
            attempt,
            zone: self.root,
        });

        let optimizer = StackingOptimizer::with_config(
            self.request.zones[self.root],
            OptimizerConfig {
                weights: self.request.weights,
                seed: Some(derive_seed(self.base_seed, attempt as u64)),
                surrogate: self.request.surrogate.clone(),
                cancel: self.request.cancel.clone(),
            },
        );
        let root_stack = match optimizer.optimize() {
            Ok(stack) => stack,
            // Zone counts were validated up front; a failure here means the
            // request changed underneath us, so treat it as a failed attempt.
            Err(err) => {
                log::error!("root optimization rejected validated counts: {err}");
                return AttemptOutcome::DropOffFailed { zone: self.root };
            }
        };
        if self.is_cancelled() {
            return AttemptOutcome::Cancelled;
        }

        self.publish(ProgressEvent::RootCompleted {
            attempt,
            zone: self.root,
            fitness: root_stack.evaluation.total(),
        });
        zones[self.root] = Some(ZoneResult {
            index: self.root,
            sequence: root_stack.sequence.clone(),
            ply_count: root_stack.sequence.len(),
            fitness: root_stack.evaluation.total(),
            is_root: true,
            ply_counts: self.request.zones[self.root],
            evaluation: root_stack.evaluation,
        });

        for &zone in &self.schedule.order {
            if zone == self.root {
                continue;
            }
            if self.is_cancelled() {
                return AttemptOutcome::Cancelled;
            }

            let parent = self.schedule.parent[zone].expect("non-root zones have parents");
            self.publish(ProgressEvent::ZoneStarted { zone, parent });

            let parent_sequence = zones[parent]
                .as_ref()
                .expect("BFS order completes parents first")
                .sequence
                .clone();

            let engine = DropOffEngine::new(parent_sequence.clone())
                .with_weights(self.request.weights)
                .with_seed(derive_seed(
                    self.base_seed,
                    0x1000 + attempt as u64 * 0x100 + zone as u64,
                ));
            let outcome = match engine.drop_to_counts(&self.request.zones[zone]) {
                Ok(Some(outcome)) => outcome,
                Ok(None) => return AttemptOutcome::DropOffFailed { zone },
                Err(err) => {
                    // Feasibility was checked up front; an infeasible report
                    // here is a bug upstream, surfaced as a failed attempt.
                    log::error!("drop-off reported infeasible targets for zone {zone}: {err}");
                    return AttemptOutcome::DropOffFailed { zone };
                }
            };

            let (sequence, dropped) = self.polish_child(&parent_sequence, outcome);
            let evaluation = self.scorer.evaluate(&sequence);
            self.publish(ProgressEvent::ZoneCompleted {
                zone,
                fitness: evaluation.total(),
            });

            transitions.push(Transition {
                parent,
                child: zone,
                dropped_indices: dropped.all(),
                dropped,
            });
            zones[zone] = Some(ZoneResult {
                index: zone,
                sequence: sequence.clone(),
                ply_count: sequence.len(),
                fitness: evaluation.total(),
                is_root: false,
                ply_counts: self.request.zones[zone],
                evaluation,
            });
        }

        AttemptOutcome::Complete
    }

    /// Bounded hill climb on a derived zone.
    ///
    /// Swaps are only admitted while the child remains a subsequence of its
    /// parent, so the published transition can always be replayed by
    /// deleting parent indices. When the polish changes the child, the
    /// dropped-index set is re-derived from the subsequence match.
    fn polish_child(
        &self,
        parent: &[Angle],
        outcome: laminopt_search::DropOutcome,
    ) -> (Vec<Angle>, DropRecord) {
        let stays_replayable = |candidate: &[Angle]| subsequence_drops(parent, candidate).is_some();
        let (polished, _) = hill_climb(
            &outcome.sequence,
            &self.scorer,
            CHILD_POLISH_ITERS,
            Some(&stays_replayable),
        );

        if polished == outcome.sequence {
            return (polished, outcome.dropped);
        }
        match subsequence_drops(parent, &polished) {
            Some(drops) => {
                let record = DropRecord::from_parent_indices(parent, &drops);
                (polished, record)
            }
            // The admissibility filter makes this unreachable; keep the
            // engine's record rather than publish an inconsistent one.
            None => (outcome.sequence, outcome.dropped),
        }
    }

    fn complete(
        &self,
        zones: Vec<Option<ZoneResult>>,
        transitions: Vec<Transition>,
    ) -> PanelResult {
        let weight = self.weight_report(&zones);
        let ramp_checks = self.ramp_checks(&zones);
        PanelResult {
            success: true,
            error: None,
            zones,
            transitions,
            root_index: self.root,
            dropoff_parents: self.schedule.parent.clone(),
            neighbor_graph: self.graph.to_vec(),
            weight,
            ramp_checks,
        }
    }

    fn partial(
        &self,
        zones: Vec<Option<ZoneResult>>,
        transitions: Vec<Transition>,
        error: Option<String>,
    ) -> PanelResult {
        let weight = self.weight_report(&zones);
        PanelResult {
            success: false,
            error,
            zones,
            transitions,
            root_index: self.root,
            dropoff_parents: self.schedule.parent.clone(),
            neighbor_graph: self.graph.to_vec(),
            weight,
            ramp_checks: Vec::new(),
        }
    }

    fn weight_report(&self, zones: &[Option<ZoneResult>]) -> WeightReport {
        let mut report = WeightReport {
            has_geometry: self.geometry.is_some(),
            zones: Vec::with_capacity(zones.len()),
            total_mass_g: 0.0,
        };
        for (index, zone) in zones.iter().enumerate() {
            let Some(zone) = zone else { continue };
            let area_mm2 = self
                .geometry
                .map_or(1.0, |geometry| geometry.area_mm2(index));
            #[expect(clippy::cast_precision_loss)]
            let mass_g =
                area_mm2 * zone.ply_count as f64 * PLY_THICKNESS_MM * DENSITY_G_PER_MM3;
            report.zones.push(ZoneWeight {
                zone: index,
                area_mm2,
                ply_count: zone.ply_count,
                mass_g,
            });
            report.total_mass_g += mass_g;
        }
        report
    }

    fn ramp_checks(&self, zones: &[Option<ZoneResult>]) -> Vec<RampCheck> {
        let Some(geometry) = self.geometry else {
            return Vec::new();
        };
        let mut checks = Vec::new();
        for (a, neighbors) in self.graph.iter().enumerate() {
            for &b in neighbors {
                if b <= a {
                    continue;
                }
                let (Some(zone_a), Some(zone_b)) = (&zones[a], &zones[b]) else {
                    continue;
                };
                let ply_difference = zone_a.ply_count.abs_diff(zone_b.ply_count);
                #[expect(clippy::cast_precision_loss)]
                let required_mm = ply_difference as f64 * RAMP_RATE_MM_PER_PLY;
                let available_mm = geometry.min_edge_mm(a).min(geometry.min_edge_mm(b));
                checks.push(RampCheck {
                    zone_a: a,
                    zone_b: b,
                    ply_difference,
                    required_mm,
                    available_mm,
                    passes: required_mm <= available_mm,
                    margin_mm: available_mm - required_mm,
                });
            }
        }
        checks
    }
}

enum AttemptOutcome {
    Complete,
    Cancelled,
    DropOffFailed { zone: usize },
}

/// Parent indices to delete so the remainder equals `child`, or `None` when
/// `child` is not a subsequence of `parent`.
fn subsequence_drops(parent: &[Angle], child: &[Angle]) -> Option<Vec<usize>> {
    if child.len() > parent.len() {
        return None;
    }
    let mut drops = Vec::with_capacity(parent.len() - child.len());
    let mut child_pos = 0;
    for (parent_pos, &angle) in parent.iter().enumerate() {
        if child_pos < child.len() && child[child_pos] == angle {
            child_pos += 1;
        } else {
            drops.push(parent_pos);
        }
    }
    (child_pos == child.len()).then_some(drops)
}

fn derive_seed(base: u64, stream: u64) -> u64 {
    base.wrapping_add(stream.wrapping_mul(0x9E37_79B9_7F4A_7C15))
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
    fn test_subsequence_drops_round_trip() {
        let parent = seq(&[45, -45, 0, 90, 0, -45, 45]);
        let child = seq(&[45, -45, 90, -45, 45]);
        let drops = subsequence_drops(&parent, &child).unwrap();
        assert_eq!(drops, vec![2, 4]);

        let mut replay = parent.clone();
        for &index in drops.iter().rev() {
            replay.remove(index);
        }
        assert_eq!(replay, child);
    }

    #[test]
    fn test_subsequence_drops_rejects_reordered_children() {
        let parent = seq(&[45, -45, 0, 90]);
        assert_eq!(subsequence_drops(&parent, &seq(&[90, 45])), None);
        assert_eq!(subsequence_drops(&parent, &seq(&[45, -45, 0, 90, 0])), None);
    }

    #[test]
    fn test_root_zone_prefers_thickest_then_lowest_index() {
        assert_eq!(root_zone(&[36, 32, 24]), 0);
        assert_eq!(root_zone(&[24, 36, 36]), 1);
    }

    #[test]
    fn test_too_few_zones() {
        let request = PanelRequest::new(vec![PlyCounts::from_pairs([
            (Angle::Zero, 4),
            (Angle::Plus45, 2),
            (Angle::Minus45, 2),
        ])]);
        assert_eq!(optimize_panel(request).unwrap_err(), PanelError::TooFewZones);
    }

    #[test]
    fn test_error_messages() {
        let disconnected = PanelError::Disconnected {
            disconnected: vec![2, 4],
        };
        assert_eq!(disconnected.to_string(), "Baglantisiz zone'lar: 2, 4");

        let infeasible = PanelError::Infeasible {
            violations: vec![FeasibilityViolation {
                parent: 0,
                child: 1,
                angle: Angle::Ninety,
                parent_count: 8,
                child_count: 10,
            }],
        };
        assert!(infeasible.to_string().starts_with("Ply sayilari uyumsuz: "));
        assert!(infeasible.to_string().contains("zone 0 -> zone 1"));
    }
}
