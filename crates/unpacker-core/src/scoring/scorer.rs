//! Concurrent scoring fan-out.
//!
//! Each backend call runs in its own task and writes nothing shared; results
//! come back through the join handles and are merged only after every call
//! has completed or failed. Provenance is written after the join in backend
//! order, so the log is deterministic regardless of completion order.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use tracing::{instrument, warn};

use super::error::{BackendFailure, ScoringError, ScoringResult};
use super::summary::{ScoreOutput, ScoreRecord, ScoreSummary};
use crate::domain::{check_score, Idea, Topic};
use crate::gateway::{decode, invoke_counted, BackendId, InvocationError, ModelGateway, Prompt, Task};
use crate::obs::emit_divergence_flagged;
use crate::provenance::{EntryDraft, ProvenanceEvent, ProvenanceTracker, Stage};

/// Scores one idea on N backends at once and aggregates their disagreement.
pub struct ParallelScorer {
    gateway: Arc<dyn ModelGateway>,
    divergence_threshold: f64,
}

impl ParallelScorer {
    pub fn new(gateway: Arc<dyn ModelGateway>, divergence_threshold: f64) -> Self {
        Self {
            gateway,
            divergence_threshold,
        }
    }

    /// Score `idea` on every backend in `backends` concurrently.
    ///
    /// Returns `Err(ScoringError::AllBackendsUnavailable)` only when *every*
    /// backend fails. Writes one provenance entry per backend invocation and
    /// one summary entry on success.
    #[instrument(skip_all, fields(idea_id = %idea.id, backends = backends.len()))]
    pub async fn score(
        &self,
        topic: &Topic,
        idea: &Idea,
        backends: &[BackendId],
        tracker: &mut ProvenanceTracker,
    ) -> ScoringResult<ScoreSummary> {
        if backends.is_empty() {
            return Err(ScoringError::NoBackends);
        }

        let prompt = Arc::new(Prompt::new(
            Task::ScoreIdea,
            json!({
                "topic": topic.text(),
                "intent": topic.intent(),
                "idea": idea,
            }),
        ));

        let handles = backends.iter().cloned().map(|backend| {
            let gateway = Arc::clone(&self.gateway);
            let prompt = Arc::clone(&prompt);
            tokio::spawn(async move {
                let started_at = Utc::now();
                let result = invoke_counted(gateway.as_ref(), &backend, &prompt).await;
                (started_at, result)
            })
        });
        let joined = join_all(handles).await;

        let mut records = Vec::new();
        let mut failures = Vec::new();

        for (backend, outcome) in backends.iter().zip(joined) {
            let (started_at, result) = match outcome {
                Ok(pair) => pair,
                Err(join_err) => (
                    Utc::now(),
                    Err(InvocationError::unavailable(format!(
                        "scoring task aborted: {join_err}"
                    ))),
                ),
            };

            let parsed = result.and_then(|value| {
                let out: ScoreOutput = decode(&value, Task::ScoreIdea.schema())?;
                check_score("score", out.score)
                    .map_err(|e| InvocationError::schema_violation(Task::ScoreIdea.schema(), e))?;
                Ok((value, out))
            });

            match parsed {
                Ok((value, out)) => {
                    tracker.append(
                        EntryDraft::new(
                            Stage::Scoring,
                            ProvenanceEvent::ScoreRecorded {
                                idea_id: idea.id.clone(),
                                score: out.score,
                            },
                        )
                        .backend(backend)
                        .at(started_at)
                        .input(prompt.as_ref())
                        .output(&value),
                    );
                    records.push(ScoreRecord {
                        idea_id: idea.id.clone(),
                        backend: backend.clone(),
                        score: out.score,
                        rationale: out.rationale,
                    });
                }
                Err(error) => {
                    warn!(backend = %backend, error = %error, "scoring backend failed");
                    tracker.append(
                        EntryDraft::new(
                            Stage::Scoring,
                            ProvenanceEvent::InvocationFailed {
                                task: Task::ScoreIdea,
                                idea_id: Some(idea.id.clone()),
                                error: error.clone(),
                            },
                        )
                        .backend(backend)
                        .at(started_at)
                        .input(prompt.as_ref()),
                    );
                    failures.push(BackendFailure {
                        backend: backend.clone(),
                        error,
                    });
                }
            }
        }

        let summary = ScoreSummary::aggregate(
            idea.id.clone(),
            records,
            failures,
            self.divergence_threshold,
        )
        .map_err(|failures| ScoringError::AllBackendsUnavailable {
            idea_id: idea.id.clone(),
            failures,
        })?;

        if summary.flagged {
            emit_divergence_flagged(idea.id.as_str(), summary.divergence, self.divergence_threshold);
        }

        tracker.append(
            EntryDraft::new(
                Stage::Scoring,
                ProvenanceEvent::ScoreSummarized {
                    idea_id: idea.id.clone(),
                    mean_score: summary.mean_score,
                    divergence: summary.divergence,
                    flagged: summary.flagged,
                    succeeded: summary.records.len(),
                    failed: summary.failures.len(),
                },
            )
            .output(&summary),
        );

        Ok(summary)
    }
}
