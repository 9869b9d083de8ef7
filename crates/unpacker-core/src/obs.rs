//! Structured observability hooks for run lifecycle events.
//!
//! - `run_span` tagging every event inside a run with its id
//! - emission functions for start, stage completion, loop transitions,
//!   divergence flags and finish

use tracing::info;

/// Span tagged with the run_id. Attach it to the run future with
/// `Instrument::instrument`; an entered guard must not be held across `.await`.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("unpacker.run", run_id = %run_id)
}

/// Emit event: run started for a topic.
pub fn emit_run_started(run_id: &str, topic: &str) {
    info!(event = "run.started", run_id = %run_id, topic = %topic);
}

/// Emit event: a pipeline stage completed.
pub fn emit_stage_completed(stage: &str, detail: &str) {
    info!(event = "stage.completed", stage = %stage, detail = %detail);
}

/// Emit event: refinement loop moved between states.
pub fn emit_loop_transition(cycle: u32, from: &str, to: &str) {
    info!(event = "loop.transition", cycle = cycle, from = %from, to = %to);
}

/// Emit event: scoring backends disagreed beyond the divergence threshold.
pub fn emit_divergence_flagged(idea_id: &str, divergence: f64, threshold: f64) {
    info!(
        event = "scoring.divergence",
        idea_id = %idea_id,
        divergence = divergence,
        threshold = threshold,
        "contested territory"
    );
}

/// Emit event: run finished with its terminal status.
pub fn emit_run_finished(run_id: &str, status: &str, duration_ms: u64, entries: u64) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        status = %status,
        duration_ms = duration_ms,
        provenance_entries = entries,
    );
}

/// Emit event: run failed at a stage (warning level).
pub fn emit_run_failed(run_id: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "run.failed", run_id = %run_id, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_name() {
        let span = run_span("test-run-id");
        if let Some(meta) = span.metadata() {
            assert_eq!(meta.name(), "unpacker.run");
        }
    }
}
