//! State owned by one refinement run.

use serde::{Deserialize, Serialize};

use super::policy::ConvergenceTracker;
use crate::domain::{Draft, Evaluation};

/// Cycle position, convergence tracking and the full draft/evaluation history.
///
/// Drafts are stored in version order: version `n` lives at index `n - 1`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefinementState {
    pub cycle: u32,
    pub convergence: ConvergenceTracker,
    drafts: Vec<Draft>,
    evaluations: Vec<Evaluation>,
}

impl RefinementState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_version(&self) -> u32 {
        self.drafts.len() as u32 + 1
    }

    pub(crate) fn push_draft(&mut self, draft: Draft) {
        debug_assert_eq!(draft.version, self.next_version());
        self.drafts.push(draft);
    }

    pub(crate) fn push_evaluation(&mut self, evaluation: Evaluation) {
        debug_assert!(self.draft(evaluation.draft_version).is_some());
        self.evaluations.push(evaluation);
    }

    pub fn draft(&self, version: u32) -> Option<&Draft> {
        let index = version.checked_sub(1)? as usize;
        self.drafts.get(index)
    }

    pub fn drafts(&self) -> &[Draft] {
        &self.drafts
    }

    pub fn evaluations(&self) -> &[Evaluation] {
        &self.evaluations
    }

    pub fn latest_draft(&self) -> Option<&Draft> {
        self.drafts.last()
    }

    pub fn last_evaluation(&self) -> Option<&Evaluation> {
        self.evaluations.last()
    }

    pub fn best_draft(&self) -> Option<&Draft> {
        self.convergence.best_version().and_then(|v| self.draft(v))
    }

    /// Evaluation scores in cycle order.
    pub fn trajectory(&self) -> Vec<f64> {
        self.evaluations.iter().map(|e| e.score).collect()
    }
}
