//! Error types for the refinement loop.

use crate::gateway::InvocationError;

/// Stage-fatal refinement failures.
#[derive(Debug, thiserror::Error)]
pub enum RefinementError {
    #[error("drafting failed on cycle {cycle} after {attempts} attempts: {last_error}")]
    DraftFailed {
        cycle: u32,
        attempts: u32,
        last_error: String,
    },

    #[error("evaluation failed on cycle {cycle}: {error}")]
    EvaluationFailed { cycle: u32, error: InvocationError },
}

/// Result type for refinement operations.
pub type RefinementResult<T> = std::result::Result<T, RefinementError>;
