use std::sync::Arc;

use serde_json::{json, Value};
use unpacker_core::domain::IdeaDraft;
use unpacker_core::fakes::ScriptedGateway;
use unpacker_core::{
    BackendId, Criteria, Idea, IdeaSet, InvocationError, LoopExit, LoopPolicy, LoopState,
    OutputFormat, ProvenanceEvent, ProvenanceTracker, RefinementError, RefinementLoop, Task, Topic,
};

fn topic() -> Topic {
    Topic::new("grief", None).unwrap()
}

fn idea() -> Idea {
    let drafts: Vec<IdeaDraft> = serde_json::from_value(json!([
        { "name": "Voicemail", "description": "keeping the last message" }
    ]))
    .unwrap();
    IdeaSet::from_drafts(drafts).iter().next().unwrap().clone()
}

fn criteria() -> Criteria {
    Criteria::new(
        OutputFormat::Poem,
        "short and concrete",
        vec!["compression".into(), "image".into()],
        85.0,
        80.0,
    )
    .unwrap()
}

fn draft(words: usize) -> Value {
    json!({
        "text": vec!["word"; words].join(" "),
        "explainer": "why it works",
    })
}

fn evaluation(score: f64, pass: bool) -> Value {
    json!({ "score": score, "pass": pass, "critique": ["tighten the ending"] })
}

fn refinement(
    gateway: Arc<ScriptedGateway>,
    max_cycles: u32,
    window: u32,
    word_limit: usize,
) -> RefinementLoop {
    RefinementLoop::new(
        gateway,
        BackendId::new("claude"),
        BackendId::new("deepseek"),
        LoopPolicy {
            max_cycles,
            plateau_threshold: 5.0,
            plateau_window: window,
        },
        word_limit,
        1,
    )
}

fn script_scores(gateway: &ScriptedGateway, scores: &[f64]) {
    for score in scores {
        gateway.respond("claude", Task::Draft, draft(10));
        gateway.respond("deepseek", Task::Evaluate, evaluation(*score, false));
    }
}

#[tokio::test]
async fn pass_on_second_cycle_accepts_without_a_third() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.respond("claude", Task::Draft, draft(10));
    gateway.respond("deepseek", Task::Evaluate, evaluation(60.0, false));
    gateway.respond("claude", Task::Draft, draft(12));
    gateway.respond("deepseek", Task::Evaluate, evaluation(88.0, true));
    let mut tracker = ProvenanceTracker::new();

    let outcome = refinement(gateway.clone(), 3, 2, 150)
        .run(&topic(), &idea(), &criteria(), &mut tracker)
        .await
        .unwrap();

    assert_eq!(outcome.terminal, LoopExit::Accepted);
    assert_eq!(outcome.chosen_version, Some(2));
    assert_eq!(outcome.cycles_used(), 2);
    assert_eq!(outcome.chosen_score(), Some(88.0));
    assert_eq!(gateway.call_count(Task::Draft), 2);
    assert_eq!(gateway.call_count(Task::Evaluate), 2);
    assert_eq!(outcome.chosen_draft().unwrap().parent_version, Some(1));
}

#[tokio::test]
async fn steady_improvement_exhausts_the_cycle_budget() {
    let gateway = Arc::new(ScriptedGateway::new());
    script_scores(&gateway, &[40.0, 55.0, 70.0]);
    let mut tracker = ProvenanceTracker::new();

    let outcome = refinement(gateway.clone(), 3, 2, 150)
        .run(&topic(), &idea(), &criteria(), &mut tracker)
        .await
        .unwrap();

    assert_eq!(outcome.terminal, LoopExit::CycleExhausted);
    assert_eq!(outcome.history.trajectory(), vec![40.0, 55.0, 70.0]);
    assert_eq!(outcome.chosen_version, Some(3));

    let cycles: Vec<u32> = outcome
        .history
        .evaluations()
        .iter()
        .map(|e| e.cycle_index)
        .collect();
    assert_eq!(cycles, vec![0, 1, 2]);
    assert!(tracker.for_cycle(3).is_empty());
}

#[tokio::test]
async fn plateau_stops_on_the_cycle_that_fills_the_window() {
    let gateway = Arc::new(ScriptedGateway::new());
    script_scores(&gateway, &[60.0, 62.0, 61.0, 90.0]);
    let mut tracker = ProvenanceTracker::new();

    let outcome = refinement(gateway.clone(), 5, 2, 150)
        .run(&topic(), &idea(), &criteria(), &mut tracker)
        .await
        .unwrap();

    assert_eq!(outcome.terminal, LoopExit::PlateauStopped);
    assert_eq!(outcome.cycles_used(), 3);
    assert_eq!(outcome.chosen_version, Some(2));
    assert_eq!(outcome.chosen_draft().unwrap().cycle_index, 1);
    assert_eq!(gateway.call_count(Task::Evaluate), 3);
}

#[tokio::test]
async fn uptick_resets_the_plateau_count() {
    let gateway = Arc::new(ScriptedGateway::new());
    // 50 is flat, 58 rises by 8 over 50, 57 and 56 are flat again.
    script_scores(&gateway, &[60.0, 50.0, 58.0, 57.0, 56.0]);
    let mut tracker = ProvenanceTracker::new();

    let outcome = refinement(gateway.clone(), 6, 2, 150)
        .run(&topic(), &idea(), &criteria(), &mut tracker)
        .await
        .unwrap();

    assert_eq!(outcome.terminal, LoopExit::PlateauStopped);
    assert_eq!(outcome.cycles_used(), 5);
    assert_eq!(outcome.chosen_version, Some(1));
}

#[tokio::test]
async fn draft_at_word_limit_is_evaluated() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.respond("claude", Task::Draft, draft(5));
    gateway.respond("deepseek", Task::Evaluate, evaluation(90.0, true));
    let mut tracker = ProvenanceTracker::new();

    let outcome = refinement(gateway.clone(), 3, 2, 5)
        .run(&topic(), &idea(), &criteria(), &mut tracker)
        .await
        .unwrap();

    assert_eq!(outcome.terminal, LoopExit::Accepted);
    assert_eq!(outcome.chosen_draft().unwrap().word_count, 5);
}

#[tokio::test]
async fn draft_over_word_limit_never_reaches_the_evaluator() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.respond("claude", Task::Draft, draft(6));
    gateway.respond("claude", Task::Draft, draft(5));
    gateway.respond("deepseek", Task::Evaluate, evaluation(90.0, true));
    let mut tracker = ProvenanceTracker::new();

    let outcome = refinement(gateway.clone(), 3, 2, 5)
        .run(&topic(), &idea(), &criteria(), &mut tracker)
        .await
        .unwrap();

    assert_eq!(outcome.terminal, LoopExit::Accepted);
    assert_eq!(outcome.history.drafts().len(), 1);
    assert_eq!(gateway.call_count(Task::Evaluate), 1);
    assert!(tracker.entries().iter().any(|e| matches!(
        e.event,
        ProvenanceEvent::DraftRejected {
            word_count: 6,
            word_limit: 5,
            ..
        }
    )));

    // The retry is told how far over the first attempt was.
    let retry = &gateway.calls()[1].1;
    assert_eq!(retry.task, Task::Draft);
    assert_eq!(retry.context["rejected_word_count"], 6);
}

#[tokio::test]
async fn persistent_draft_failure_ends_in_draft_failed() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.fail(
        "claude",
        Task::Draft,
        InvocationError::Unavailable {
            detail: "503".into(),
        },
    );
    gateway.respond("claude", Task::Draft, draft(9));
    let mut tracker = ProvenanceTracker::new();

    let err = refinement(gateway.clone(), 3, 2, 5)
        .run(&topic(), &idea(), &criteria(), &mut tracker)
        .await
        .unwrap_err();

    match err {
        RefinementError::DraftFailed {
            cycle, attempts, ..
        } => {
            assert_eq!(cycle, 0);
            assert_eq!(attempts, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(gateway.call_count(Task::Evaluate), 0);
    assert!(tracker.entries().iter().any(|e| matches!(
        e.event,
        ProvenanceEvent::LoopTransition {
            to: LoopState::DraftFailed,
            ..
        }
    )));
}

#[tokio::test]
async fn evaluator_failure_is_fatal() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.respond("claude", Task::Draft, draft(10));
    gateway.fail(
        "deepseek",
        Task::Evaluate,
        InvocationError::Timeout { after_ms: 60_000 },
    );
    let mut tracker = ProvenanceTracker::new();

    let err = refinement(gateway.clone(), 3, 2, 150)
        .run(&topic(), &idea(), &criteria(), &mut tracker)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RefinementError::EvaluationFailed { cycle: 0, .. }
    ));
}

#[tokio::test]
async fn missing_pass_flag_is_derived_from_the_bar() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.respond("claude", Task::Draft, draft(10));
    gateway.respond("deepseek", Task::Evaluate, json!({ "total_score": 84.0 }));
    gateway.respond("claude", Task::Draft, draft(10));
    gateway.respond("deepseek", Task::Evaluate, json!({ "total_score": 85.0 }));
    let mut tracker = ProvenanceTracker::new();

    let outcome = refinement(gateway.clone(), 3, 2, 150)
        .run(&topic(), &idea(), &criteria(), &mut tracker)
        .await
        .unwrap();

    let passed: Vec<bool> = outcome.history.evaluations().iter().map(|e| e.passed).collect();
    assert_eq!(passed, vec![false, true]);
    assert_eq!(outcome.terminal, LoopExit::Accepted);
}

#[tokio::test]
async fn critique_is_carried_into_the_next_draft() {
    let gateway = Arc::new(ScriptedGateway::new());
    script_scores(&gateway, &[40.0, 60.0]);
    let mut tracker = ProvenanceTracker::new();

    refinement(gateway.clone(), 2, 2, 150)
        .run(&topic(), &idea(), &criteria(), &mut tracker)
        .await
        .unwrap();

    let drafts: Vec<Value> = gateway
        .calls()
        .into_iter()
        .filter(|(_, p)| p.task == Task::Draft)
        .map(|(_, p)| p.context)
        .collect();
    assert_eq!(drafts[0]["critique"], Value::Null);
    assert_eq!(drafts[1]["critique"], json!(["tighten the ending"]));
    assert_eq!(drafts[1]["cycle"], 1);
}
