use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use unpacker_core::domain::IdeaDraft;
use unpacker_core::fakes::ScriptedGateway;
use unpacker_core::{
    BackendId, IdeaSet, InvocationError, ParallelScorer, ProvenanceEvent, ProvenanceTracker,
    ScoringError, Stage, Task, Topic,
};

fn ideas() -> IdeaSet {
    let drafts: Vec<IdeaDraft> = serde_json::from_value(json!([
        { "name": "Inheritance", "description": "what the dead leave in drawers" },
        { "name": "Anniversaries", "description": "dates that keep arriving" },
    ]))
    .unwrap();
    IdeaSet::from_drafts(drafts)
}

fn topic() -> Topic {
    Topic::new("grief", Some("losing a parent at thirty")).unwrap()
}

fn backends(ids: &[&str]) -> Vec<BackendId> {
    ids.iter().map(|id| BackendId::new(*id)).collect()
}

#[tokio::test]
async fn single_success_with_one_failure_is_not_flagged() {
    let gateway = ScriptedGateway::new();
    gateway.respond("gpt", Task::ScoreIdea, json!({ "score": 72, "rationale": "fresh" }));
    gateway.fail(
        "deepseek",
        Task::ScoreIdea,
        InvocationError::Timeout { after_ms: 60_000 },
    );
    let scorer = ParallelScorer::new(Arc::new(gateway), 20.0);
    let ideas = ideas();
    let idea = ideas.iter().next().unwrap();
    let mut tracker = ProvenanceTracker::new();

    let summary = scorer
        .score(&topic(), idea, &backends(&["gpt", "deepseek"]), &mut tracker)
        .await
        .unwrap();

    assert_eq!(summary.mean_score, 72.0);
    assert_eq!(summary.divergence, 0.0);
    assert!(!summary.flagged);
    assert_eq!(summary.records.len(), 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].backend.as_str(), "deepseek");

    // One entry per invocation plus the summary.
    assert_eq!(tracker.len(), 3);
    assert!(matches!(
        tracker.entries()[1].event,
        ProvenanceEvent::InvocationFailed {
            task: Task::ScoreIdea,
            ..
        }
    ));
}

#[tokio::test]
async fn wide_disagreement_is_flagged() {
    let gateway = ScriptedGateway::new();
    gateway.respond("gpt", Task::ScoreIdea, json!({ "score": 40 }));
    gateway.respond("deepseek", Task::ScoreIdea, json!({ "score": 90 }));
    let scorer = ParallelScorer::new(Arc::new(gateway), 30.0);
    let ideas = ideas();
    let mut tracker = ProvenanceTracker::new();

    let summary = scorer
        .score(
            &topic(),
            ideas.iter().next().unwrap(),
            &backends(&["gpt", "deepseek"]),
            &mut tracker,
        )
        .await
        .unwrap();

    assert_eq!(summary.divergence, 50.0);
    assert!(summary.flagged);
    assert_eq!(summary.mean_score, 65.0);
}

#[tokio::test]
async fn all_failures_surface_every_backend_error() {
    let gateway = ScriptedGateway::new();
    gateway.fail(
        "gpt",
        Task::ScoreIdea,
        InvocationError::RateLimited {
            detail: "429".into(),
        },
    );
    // Score outside [0, 100] is a schema violation, not a record.
    gateway.respond("deepseek", Task::ScoreIdea, json!({ "score": 140 }));
    let scorer = ParallelScorer::new(Arc::new(gateway), 20.0);
    let ideas = ideas();
    let mut tracker = ProvenanceTracker::new();

    let err = scorer
        .score(
            &topic(),
            ideas.iter().next().unwrap(),
            &backends(&["gpt", "deepseek"]),
            &mut tracker,
        )
        .await
        .unwrap_err();

    match err {
        ScoringError::AllBackendsUnavailable { idea_id, failures } => {
            assert_eq!(idea_id.as_str(), "idea-0");
            assert_eq!(failures.len(), 2);
            assert!(matches!(
                failures[1].error,
                InvocationError::SchemaViolation { .. }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    // Both failures are on record even though the stage failed.
    assert_eq!(tracker.for_stage(Stage::Scoring).len(), 2);
}

#[tokio::test]
async fn provenance_follows_backend_order_not_completion_order() {
    let gateway = ScriptedGateway::new();
    gateway.respond("slow", Task::ScoreIdea, json!({ "score": 50 }));
    gateway.respond("fast", Task::ScoreIdea, json!({ "score": 60 }));
    gateway.delay("slow", Duration::from_millis(50));
    let gateway = Arc::new(gateway);
    let scorer = ParallelScorer::new(gateway.clone(), 20.0);
    let ideas = ideas();
    let mut tracker = ProvenanceTracker::new();

    scorer
        .score(
            &topic(),
            ideas.iter().next().unwrap(),
            &backends(&["slow", "fast"]),
            &mut tracker,
        )
        .await
        .unwrap();

    let recorded: Vec<&str> = tracker
        .entries()
        .iter()
        .filter_map(|e| e.backend.as_ref().map(|b| b.as_str()))
        .collect();
    assert_eq!(recorded, vec!["slow", "fast"]);
    assert_eq!(gateway.call_count(Task::ScoreIdea), 2);
}

#[tokio::test]
async fn divergence_does_not_depend_on_backend_order() {
    let mut divergences = Vec::new();
    for order in [["a", "b", "c"], ["c", "a", "b"]] {
        let gateway = ScriptedGateway::new();
        gateway.respond("a", Task::ScoreIdea, json!({ "score": 12.5 }));
        gateway.respond("b", Task::ScoreIdea, json!({ "score": 77 }));
        gateway.respond("c", Task::ScoreIdea, json!({ "score": 40 }));
        let scorer = ParallelScorer::new(Arc::new(gateway), 10.0);
        let ideas = ideas();
        let mut tracker = ProvenanceTracker::new();
        let summary = scorer
            .score(
                &topic(),
                ideas.iter().next().unwrap(),
                &backends(&order),
                &mut tracker,
            )
            .await
            .unwrap();
        divergences.push(summary.divergence);
    }
    assert_eq!(divergences, vec![64.5, 64.5]);
}
