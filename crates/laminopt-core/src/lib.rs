//! Core data types and sequence primitives for laminate stacking design.
//!
//! A stacking sequence is an ordered list of [`Angle`] values read from one
//! outer surface of the laminate to the other. This crate provides:
//!
//! - [`Angle`] and [`PlyCounts`] — the closed four-angle orientation set and
//!   the fixed per-angle count table derived from it
//! - [`sequence`] — structural predicates and the hard manufacturing
//!   constraints every surfaced sequence must satisfy
//! - [`grouping`] — run statistics (adjacent identical plies)
//! - [`builder`] — construction of mirror-symmetric seed sequences that
//!   already satisfy the hard constraints
//! - [`moves`] — local, reversible mutation operators that preserve ply
//!   counts and mid-plane symmetry
//!
//! Everything here is deterministic given the caller-supplied random number
//! generator; no operation performs I/O.

pub use self::{
    angle::Angle,
    counts::PlyCounts,
    grouping::GroupingStats,
    sequence::HardViolation,
};

pub mod angle;
pub mod builder;
pub mod counts;
pub mod grouping;
pub mod moves;
pub mod sequence;
