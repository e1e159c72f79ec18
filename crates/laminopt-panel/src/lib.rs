//! Multi-zone panel orchestration.
//!
//! A panel is a set of zones, each with its own per-angle ply counts and
//! optionally a rectangle describing where it sits. The orchestrator:
//!
//! 1. builds the neighbour graph (rectangle adjacency, or a chain when no
//!    geometry is supplied),
//! 2. picks the thickest zone as root and checks that every zone is
//!    reachable from it,
//! 3. checks drop-off feasibility along the BFS parent schedule,
//! 4. optimizes the root with the single-zone optimizer, then derives every
//!    other zone from its parent through the drop-off engine (with a short
//!    polish pass that keeps each child replayable from its parent),
//! 5. reports weight and ramp feasibility.
//!
//! Ply continuity is the point: a thinner zone is always obtained by
//! removing plies from its thicker neighbour, never re-stacked from
//! scratch.

pub use self::{
    geometry::Rect,
    orchestrator::{
        FeasibilityViolation, PanelError, PanelRequest, PanelResult, RampCheck, Transition,
        ZoneResult, ZoneWeight, WeightReport, optimize_panel,
    },
    progress::{ProgressEvent, ProgressSink},
};

pub mod geometry;
pub mod graph;
pub mod orchestrator;
pub mod progress;
