//! Error types for parallel scoring.

use serde::{Deserialize, Serialize};

use crate::domain::IdeaId;
use crate::gateway::{BackendId, InvocationError};

/// A scoring backend that did not produce a usable score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendFailure {
    pub backend: BackendId,
    pub error: InvocationError,
}

/// Errors produced by the scoring layer.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("all {} scoring backends failed for {idea_id}", .failures.len())]
    AllBackendsUnavailable {
        idea_id: IdeaId,
        failures: Vec<BackendFailure>,
    },

    #[error("no scoring backends supplied")]
    NoBackends,
}

/// Result type for scoring operations.
pub type ScoringResult<T> = std::result::Result<T, ScoringError>;
