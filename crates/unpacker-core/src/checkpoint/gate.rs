//! The suspension point between scoring and refinement.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use super::decision::{CheckpointState, Decision};
use super::error::{CheckpointError, CheckpointResult};
use crate::domain::check_score;
use crate::provenance::{EntryDraft, ProvenanceEvent, ProvenanceTracker, Stage};

/// Concrete checkpoint I/O: a terminal prompt, a web form, a test script.
#[async_trait]
pub trait HumanInterface: Send + Sync {
    async fn present(&self, state: &CheckpointState) -> CheckpointResult<Decision>;
}

/// Presents run state to a human and validates the answer.
///
/// A human decision is never retried. Every decision, valid or not, is
/// written to provenance before it is acted on.
pub struct CheckpointGate {
    human: Arc<dyn HumanInterface>,
    max_rounds: u32,
}

impl CheckpointGate {
    pub fn new(human: Arc<dyn HumanInterface>, max_rounds: u32) -> Self {
        Self { human, max_rounds }
    }

    #[instrument(skip_all, fields(round = state.round, selected = %state.selected))]
    pub async fn present(
        &self,
        state: &CheckpointState,
        tracker: &mut ProvenanceTracker,
    ) -> CheckpointResult<Decision> {
        let decision = self.human.present(state).await?;
        info!(decision = decision.label(), "checkpoint decided");

        tracker.append(
            EntryDraft::new(
                Stage::Checkpoint,
                ProvenanceEvent::CheckpointDecided {
                    round: state.round,
                    decision: decision.clone(),
                },
            )
            .input(state),
        );

        if let Decision::Revise { revision } = &decision {
            if state.round >= self.max_rounds {
                return Err(CheckpointError::RevisionLimit {
                    round: state.round,
                    max: self.max_rounds,
                });
            }
            if let Some(id) = &revision.idea {
                if state.ideas.get(id).is_none() {
                    return Err(CheckpointError::UnknownIdea(id.clone()));
                }
            }
            if let Some(bar) = revision.minimum_bar {
                check_score("minimum_bar", bar)?;
            }
        }

        Ok(decision)
    }
}
