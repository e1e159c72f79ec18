//! Search routines for laminate stacking design.
//!
//! Two engines live here:
//!
//! - [`StackingOptimizer`] — the single-zone three-phase hybrid search:
//!   constructive skeletons, multi-start evolutionary search on a fixed
//!   worker pool, then hill-climbing refinement. Produces the master
//!   sequence for the thickest zone of a panel.
//! - [`DropOffEngine`] — derives a thinner child sequence from a parent by
//!   removing plies (symmetric pairs wherever parity allows), preserving
//!   the hard constraints and as much rule compliance as possible.
//!
//! Both engines take explicit seeds and are deterministic for a given seed,
//! including when the evolutionary runs execute in parallel.

pub use self::{
    dropoff::{DropOffEngine, DropOffError, DropOutcome, DropRecord},
    local_search::hill_climb,
    optimizer::{InfeasibleCountsError, OptimizedStack, OptimizerConfig, StackingOptimizer},
};

pub mod dropoff;
pub mod local_search;
pub mod optimizer;
