//! Parallel scoring with divergence detection.
//!
//! # Module layout
//!
//! - [`summary`] — `ScoreRecord`, `ScoreSummary` and the aggregation rule
//! - [`error`] — `ScoringError`, `BackendFailure`
//! - [`scorer`] — `ParallelScorer`, the concurrent fan-out

pub mod error;
pub mod scorer;
pub mod summary;

pub use error::{BackendFailure, ScoringError, ScoringResult};
pub use scorer::ParallelScorer;
pub use summary::{ScoreOutput, ScoreRecord, ScoreSummary};
