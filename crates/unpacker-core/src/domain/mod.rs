//! Domain models for Idea Unpacker.
//!
//! Canonical definitions for the values that flow through a run:
//! - `Topic`, `Idea`, `IdeaSet`: input and candidate angles
//! - `Criteria`, `CriteriaRevision`: the acceptance rubric
//! - `Draft`, `Evaluation`: refinement history

pub mod criteria;
pub mod digest;
pub mod draft;
pub mod error;
pub mod topic;

pub use criteria::{Criteria, CriteriaDraft, CriteriaRevision, OutputFormat};
pub use draft::{word_count, Draft, DraftOutput, Evaluation, EvaluationOutput};
pub use error::{Result, UnpackerError, ValidationError};
pub use topic::{Idea, IdeaDraft, IdeaId, IdeaSet, Topic};

/// Lowest score any backend may report.
pub const SCORE_MIN: f64 = 0.0;
/// Highest score any backend may report.
pub const SCORE_MAX: f64 = 100.0;

/// Check that `value` lies on the shared score scale.
pub fn check_score(field: &'static str, value: f64) -> std::result::Result<f64, ValidationError> {
    if value.is_finite() && (SCORE_MIN..=SCORE_MAX).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::OutOfRange {
            field,
            value,
            min: SCORE_MIN,
            max: SCORE_MAX,
        })
    }
}
