//! Dependency-free descriptive statistics.
//!
//! Small numeric summaries shared by the distribution rule (spread of ply
//! spacings), the drop-off engine (uniformity of drop positions) and report
//! assembly. Population variance throughout: the inputs are complete
//! enumerations (all gaps of a sequence, all drop positions), never samples.

pub use self::descriptive::DescriptiveStats;

pub mod descriptive;
