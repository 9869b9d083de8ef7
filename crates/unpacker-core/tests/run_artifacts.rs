use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;
use unpacker_core::fakes::{ScriptedGateway, ScriptedHuman};
use unpacker_core::{
    read_artifact_file, read_run_artifact, replay, write_run_artifact, Decision, PipelineConfig,
    ProvenanceTracker, RunStatus, StageSequencer, Task, Topic, UnpackerError,
};

async fn aborted_run() -> unpacker_core::PipelineOutput {
    let gateway = ScriptedGateway::new();
    gateway.respond(
        "claude",
        Task::GenerateIdeas,
        json!([{ "name": "Thresholds", "description": "doors we stop using" }]),
    );
    gateway.always("gpt", Task::ScoreIdea, json!({ "score": 66 }));
    gateway.always("deepseek", Task::ScoreIdea, json!({ "score": 71 }));

    let sequencer = StageSequencer::new(
        Arc::new(gateway),
        Arc::new(ScriptedHuman::new([Decision::Abort])),
        PipelineConfig::default(),
    )
    .unwrap();
    let mut tracker = ProvenanceTracker::new();
    sequencer
        .run(Topic::new("moving house", None).unwrap(), &mut tracker)
        .await
        .unwrap()
}

#[tokio::test]
async fn artifact_round_trips_with_digest() {
    let dir = tempdir().unwrap();
    let output = aborted_run().await;

    let path = write_run_artifact(&output, dir.path()).unwrap();
    assert!(path.ends_with("output.json"));
    assert!(dir.path().join(&output.run_id).join("output.digest").exists());

    let loaded = read_run_artifact(&output.run_id, dir.path()).unwrap();
    assert_eq!(loaded, output);
    assert_eq!(read_artifact_file(&path).unwrap(), output);

    let summary = replay(&loaded.provenance_log).unwrap();
    assert_eq!(summary.status, RunStatus::UserAborted);
    assert_eq!(summary.run_id, output.run_id);
}

#[tokio::test]
async fn tampered_artifact_is_rejected() {
    let dir = tempdir().unwrap();
    let output = aborted_run().await;
    let path = write_run_artifact(&output, dir.path()).unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    bytes.extend_from_slice(b"\n");
    std::fs::write(&path, bytes).unwrap();

    let err = read_run_artifact(&output.run_id, dir.path()).unwrap_err();
    assert!(matches!(err, UnpackerError::DigestMismatch { .. }));
}

#[test]
fn missing_artifact_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = read_run_artifact("no-such-run", dir.path()).unwrap_err();
    assert!(matches!(err, UnpackerError::Io(_)));
}
