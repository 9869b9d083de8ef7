use std::sync::Arc;

use serde_json::json;
use unpacker_core::checkpoint::CheckpointError;
use unpacker_core::domain::IdeaDraft;
use unpacker_core::fakes::ScriptedHuman;
use unpacker_core::{
    CheckpointGate, CheckpointState, CriteriaRevision, Decision, IdeaId, IdeaSet, ProvenanceEvent,
    ProvenanceTracker, ScoreSummary, Stage, Topic,
};

fn state(round: u32) -> CheckpointState {
    let drafts: Vec<IdeaDraft> = serde_json::from_value(json!([
        { "name": "Voicemail", "description": "keeping the last message" },
        { "name": "Inheritance", "description": "what the dead leave in drawers" },
    ]))
    .unwrap();
    let ideas = IdeaSet::from_drafts(drafts);
    let summaries = ideas
        .iter()
        .map(|idea| ScoreSummary {
            idea_id: idea.id.clone(),
            mean_score: 70.0,
            divergence: if idea.id == IdeaId::from_index(1) { 45.0 } else { 5.0 },
            flagged: idea.id == IdeaId::from_index(1),
            records: vec![],
            failures: vec![],
        })
        .collect();
    CheckpointState {
        round,
        topic: Topic::new("grief", None).unwrap(),
        ideas,
        summaries,
        selected: IdeaId::from_index(0),
        pending_criteria: None,
    }
}

#[tokio::test]
async fn approve_is_recorded_with_round() {
    let human = Arc::new(ScriptedHuman::new([Decision::Approve]));
    let gate = CheckpointGate::new(human.clone(), 3);
    let mut tracker = ProvenanceTracker::new();
    let state = state(1);

    let decision = gate.present(&state, &mut tracker).await.unwrap();

    assert_eq!(decision, Decision::Approve);
    assert_eq!(human.presented(), vec![state.clone()]);
    assert_eq!(state.contested().count(), 1);
    assert_eq!(state.selected_idea().unwrap().name, "Voicemail");
    let entry = &tracker.entries()[0];
    assert_eq!(entry.stage, Stage::Checkpoint);
    assert!(entry.input_digest.is_some());
    assert_eq!(
        entry.event,
        ProvenanceEvent::CheckpointDecided {
            round: 1,
            decision: Decision::Approve,
        }
    );
}

#[tokio::test]
async fn revision_with_out_of_range_bar_is_rejected() {
    let human = Arc::new(ScriptedHuman::new([Decision::Revise {
        revision: CriteriaRevision {
            minimum_bar: Some(120.0),
            ..Default::default()
        },
    }]));
    let gate = CheckpointGate::new(human, 3);
    let mut tracker = ProvenanceTracker::new();

    let err = gate.present(&state(1), &mut tracker).await.unwrap_err();

    assert!(matches!(err, CheckpointError::InvalidRevision(_)));
    assert_eq!(tracker.len(), 1);
}

#[tokio::test]
async fn revision_on_last_round_is_rejected_but_abort_is_not() {
    let human = Arc::new(ScriptedHuman::new([
        Decision::Revise {
            revision: CriteriaRevision::default(),
        },
        Decision::Abort,
    ]));
    let gate = CheckpointGate::new(human, 2);
    let mut tracker = ProvenanceTracker::new();

    let err = gate.present(&state(2), &mut tracker).await.unwrap_err();
    assert!(matches!(
        err,
        CheckpointError::RevisionLimit { round: 2, max: 2 }
    ));

    let decision = gate.present(&state(2), &mut tracker).await.unwrap();
    assert_eq!(decision, Decision::Abort);
}

#[tokio::test]
async fn silent_human_is_an_interface_error() {
    let gate = CheckpointGate::new(Arc::new(ScriptedHuman::new([])), 3);
    let mut tracker = ProvenanceTracker::new();

    let err = gate.present(&state(1), &mut tracker).await.unwrap_err();

    assert!(matches!(err, CheckpointError::Interface(_)));
    assert!(tracker.is_empty());
}
