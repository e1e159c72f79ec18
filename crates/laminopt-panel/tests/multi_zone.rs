//! End-to-end multi-zone scenarios.

use std::sync::{Arc, atomic::AtomicBool};

use laminopt_core::{Angle, PlyCounts, sequence};
use laminopt_panel::{
    PanelError, PanelRequest, ProgressEvent, ProgressSink, Rect, optimize_panel,
};

fn counts(zero: usize, ninety: usize, plus: usize, minus: usize) -> PlyCounts {
    PlyCounts::from_pairs([
        (Angle::Zero, zero),
        (Angle::Ninety, ninety),
        (Angle::Plus45, plus),
        (Angle::Minus45, minus),
    ])
}

fn three_zone_request(seed: u64) -> PanelRequest {
    let mut request = PanelRequest::new(vec![
        counts(12, 8, 8, 8),
        counts(8, 8, 8, 8),
        counts(6, 6, 6, 6),
    ]);
    request.seed = Some(seed);
    request
}

#[test]
fn test_three_zone_taper_without_geometry() {
    let result = optimize_panel(three_zone_request(404)).unwrap();

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.root_index, 0);
    assert_eq!(result.dropoff_parents, vec![None, Some(0), Some(1)]);

    for (index, zone) in result.zones.iter().enumerate() {
        let zone = zone.as_ref().expect("all zones complete");
        assert_eq!(zone.index, index);
        assert_eq!(PlyCounts::from_sequence(&zone.sequence), zone.ply_counts);
        assert_eq!(sequence::hard_violation(&zone.sequence), None);
        assert!(zone.fitness > 0.0);
    }
    let root = result.zones[0].as_ref().unwrap();
    assert!(root.is_root);
    assert_eq!(root.ply_count, 36);
    assert!(sequence::is_mirror_symmetric(&root.sequence));

    // Every child's counts fit within its parent's.
    for transition in &result.transitions {
        let parent = result.zones[transition.parent].as_ref().unwrap();
        let child = result.zones[transition.child].as_ref().unwrap();
        assert!(child.ply_counts.fits_within(&parent.ply_counts));
        assert_eq!(
            transition.dropped_indices.len(),
            parent.ply_count - child.ply_count
        );
        // Replaying the dropped indices against the parent reproduces the
        // child (the polish pass keeps children subsequence-derivable).
        let mut replay = parent.sequence.clone();
        for &index in transition.dropped_indices.iter().rev() {
            replay.remove(index);
        }
        assert_eq!(replay, child.sequence);
    }
    assert_eq!(result.transitions.len(), 2);

    // Without geometry: unit areas, no ramp checks.
    assert!(!result.weight.has_geometry);
    assert!(result.ramp_checks.is_empty());
    let masses: Vec<f64> = result.weight.zones.iter().map(|z| z.mass_g).collect();
    assert!((masses[0] - 36.0 * 0.125 * 1.58e-3).abs() < 1e-9);
}

#[test]
fn test_disconnected_zone_is_rejected() {
    let mut request = three_zone_request(1);
    request.bounds = Some(vec![
        Rect { x: 0.0, y: 0.0, w: 200.0, h: 150.0 },
        Rect { x: 210.0, y: 0.0, w: 200.0, h: 150.0 },
        Rect { x: 2000.0, y: 2000.0, w: 100.0, h: 100.0 },
    ]);

    let err = optimize_panel(request).unwrap_err();
    assert_eq!(
        err,
        PanelError::Disconnected {
            disconnected: vec![2]
        }
    );
    assert_eq!(err.to_string(), "Baglantisiz zone'lar: 2");
}

#[test]
fn test_count_inflation_is_enumerated() {
    let mut request = PanelRequest::new(vec![
        counts(12, 8, 8, 8),
        // More 90° and more −45° than the parent holds.
        counts(8, 10, 8, 9),
    ]);
    request.seed = Some(2);

    let err = optimize_panel(request).unwrap_err();
    let PanelError::Infeasible { violations } = err else {
        panic!("expected feasibility error, got {err:?}");
    };
    assert_eq!(violations.len(), 2);
    assert!(violations.iter().any(|v| v.angle == Angle::Ninety
        && v.parent_count == 8
        && v.child_count == 10));
    assert!(violations.iter().any(|v| v.angle == Angle::Minus45));
}

#[test]
fn test_geometry_drives_weight_and_ramps() {
    let mut request = PanelRequest::new(vec![counts(8, 4, 4, 4), counts(4, 4, 4, 4)]);
    request.seed = Some(9);
    // Two 300×150 px strips side by side; extent 600 px → 0.5 mm/px.
    request.bounds = Some(vec![
        Rect { x: 0.0, y: 0.0, w: 300.0, h: 150.0 },
        Rect { x: 300.0, y: 0.0, w: 300.0, h: 150.0 },
    ]);

    let result = optimize_panel(request).unwrap();
    assert!(result.success);
    assert!(result.weight.has_geometry);

    // 150×75 mm zones.
    let w0 = &result.weight.zones[0];
    assert!((w0.area_mm2 - 150.0 * 75.0).abs() < 1e-6);
    assert!((w0.mass_g - 150.0 * 75.0 * 20.0 * 0.125 * 1.58e-3).abs() < 1e-6);

    assert_eq!(result.ramp_checks.len(), 1);
    let ramp = &result.ramp_checks[0];
    assert_eq!(ramp.ply_difference, 4);
    assert!((ramp.required_mm - 2.0).abs() < 1e-9);
    assert!((ramp.available_mm - 75.0).abs() < 1e-9);
    assert!(ramp.passes);
    assert!((ramp.margin_mm - 73.0).abs() < 1e-9);
}

#[test]
fn test_identical_seeds_produce_identical_panels() {
    let a = optimize_panel(three_zone_request(77)).unwrap();
    let b = optimize_panel(three_zone_request(77)).unwrap();

    for (za, zb) in a.zones.iter().zip(&b.zones) {
        assert_eq!(
            za.as_ref().unwrap().sequence,
            zb.as_ref().unwrap().sequence
        );
    }
    for (ta, tb) in a.transitions.iter().zip(&b.transitions) {
        assert_eq!(ta.dropped_indices, tb.dropped_indices);
    }
}

#[test]
fn test_cancellation_returns_partial_result() {
    let mut request = three_zone_request(5);
    request.cancel = Some(Arc::new(AtomicBool::new(true)));

    let result = optimize_panel(request).unwrap();
    assert!(!result.success);
    assert!(result.zones.iter().all(Option::is_none));
}

#[test]
fn test_progress_events_follow_bfs_order() {
    let (sink, receiver) = ProgressSink::bounded(256);
    let mut request = three_zone_request(31);
    request.progress = Some(sink);

    let result = optimize_panel(request).unwrap();
    assert!(result.success);

    let events: Vec<ProgressEvent> = receiver.try_iter().collect();
    let zone_completions: Vec<usize> = events
        .iter()
        .filter_map(|event| match event {
            ProgressEvent::ZoneCompleted { zone, .. } => Some(*zone),
            _ => None,
        })
        .collect();
    assert_eq!(zone_completions, vec![1, 2]);
    assert!(matches!(events[0], ProgressEvent::RootStarted { zone: 0, .. }));
}
