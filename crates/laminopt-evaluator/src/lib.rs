//! Rule evaluator for laminate stacking sequences.
//!
//! A deterministic, pure scoring function: given a sequence, it produces a
//! total fitness in \[0, 100\] plus a per-rule breakdown. Hard manufacturing
//! constraints are checked first and short-circuit to a zero-score
//! diagnostic; the eight soft lamination rules then each contribute a
//! weighted sub-score.
//!
//! # Architecture
//!
//! ```text
//! Scorer (trait — what the search loops call)
//!     ├── ExactScorer (full rule evaluation, authoritative)
//!     └── LinearSurrogate (cheap weighted feature model, optional accelerator)
//! ```
//!
//! The evaluator is total: every input maps to an [`Evaluation`], including
//! hard-constraint violations and the empty sequence. It never errors, never
//! mutates, and never consults a random number generator, so
//! `evaluate(optimize(counts))` always reproduces the score the optimizer
//! reported.
//!
//! # Rules
//!
//! | Rule | Name | Default weight |
//! |------|------|----------------|
//! | R1 | Symmetry | 18.0 |
//! | R2 | ±45 balance | 12.0 |
//! | R3 | Percentage | 13.0 |
//! | R4 | External plies | 12.0 |
//! | R5 | Distribution | 14.0 |
//! | R6 | Grouping | 20.5 |
//! | R7 | Buckling | 3.5 |
//! | R8 | Lateral bending | 7.0 |
//!
//! Weights sum to 100 and are caller-replaceable via [`RuleWeights`].

pub use self::{
    evaluation::{Evaluation, MAX_SCORE, RuleScore, ScoreBreakdown, evaluate},
    scorer::{ExactScorer, LinearSurrogate, Scorer},
    weights::{Rule, RuleWeights},
};

pub mod evaluation;
mod rules;
pub mod scorer;
pub mod weights;
