//! What the human sees at the checkpoint, and what they can answer.

use serde::{Deserialize, Serialize};

use crate::domain::{Criteria, CriteriaRevision, Idea, IdeaId, IdeaSet, Topic};
use crate::scoring::ScoreSummary;

/// The three-way answer to a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Proceed with the selected idea and pending criteria.
    Approve,
    /// Replace the pending criteria and re-run criteria formatting.
    Revise { revision: CriteriaRevision },
    /// End the run. A normal terminal outcome, not an error.
    Abort,
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Revise { .. } => "revise",
            Decision::Abort => "abort",
        }
    }
}

/// Snapshot of the run presented for a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// 1-based presentation count.
    pub round: u32,
    pub topic: Topic,
    pub ideas: IdeaSet,
    /// One summary per idea, in idea order.
    pub summaries: Vec<ScoreSummary>,
    pub selected: IdeaId,
    /// `None` until criteria have been formatted once.
    pub pending_criteria: Option<Criteria>,
}

impl CheckpointState {
    pub fn selected_idea(&self) -> Option<&Idea> {
        self.ideas.get(&self.selected)
    }

    pub fn summary_for(&self, id: &IdeaId) -> Option<&ScoreSummary> {
        self.summaries.iter().find(|s| &s.idea_id == id)
    }

    /// Ideas whose scorers disagreed beyond the threshold.
    pub fn contested(&self) -> impl Iterator<Item = &ScoreSummary> {
        self.summaries.iter().filter(|s| s.flagged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_serde_tag() {
        let json = serde_json::to_value(Decision::Abort).unwrap();
        assert_eq!(json["decision"], "abort");

        let revise = Decision::Revise {
            revision: CriteriaRevision {
                criteria: vec!["restraint".into()],
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&revise).unwrap();
        assert_eq!(json["decision"], "revise");
        let back: Decision = serde_json::from_value(json).unwrap();
        assert_eq!(back, revise);
        assert_eq!(back.label(), "revise");
    }
}
