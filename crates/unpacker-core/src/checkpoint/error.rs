//! Error types for the checkpoint gate.

use crate::domain::{IdeaId, ValidationError};

/// Checkpoint contract violations. All are stage-fatal.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("human interface failed: {0}")]
    Interface(String),

    #[error("revision names unknown idea {0}")]
    UnknownIdea(IdeaId),

    #[error("invalid revision: {0}")]
    InvalidRevision(#[from] ValidationError),

    #[error("revision requested on round {round}, limit is {max} rounds")]
    RevisionLimit { round: u32, max: u32 },
}

/// Result type for checkpoint operations.
pub type CheckpointResult<T> = std::result::Result<T, CheckpointError>;
