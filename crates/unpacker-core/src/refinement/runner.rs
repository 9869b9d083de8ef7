//! The draft/evaluate driver.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use super::error::{RefinementError, RefinementResult};
use super::policy::LoopPolicy;
use super::state::RefinementState;
use super::{LoopExit, LoopState};
use crate::domain::draft::MAX_CRITIQUE_ITEMS;
use crate::domain::{
    check_score, word_count, Criteria, Draft, DraftOutput, Evaluation, EvaluationOutput, Idea,
    Topic,
};
use crate::gateway::{decode, invoke_counted, BackendId, InvocationError, ModelGateway, Prompt, Task};
use crate::metrics::METRICS;
use crate::obs::emit_loop_transition;
use crate::provenance::{EntryDraft, ProvenanceEvent, ProvenanceTracker, Stage};

/// How a refinement run ended, with the history behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementOutcome {
    pub terminal: LoopExit,
    /// The accepted draft, or the best-scoring one otherwise.
    pub chosen_version: Option<u32>,
    pub history: RefinementState,
}

impl RefinementOutcome {
    pub fn chosen_draft(&self) -> Option<&Draft> {
        self.chosen_version.and_then(|v| self.history.draft(v))
    }

    pub fn chosen_score(&self) -> Option<f64> {
        let version = self.chosen_version?;
        self.history
            .evaluations()
            .iter()
            .find(|e| e.draft_version == version)
            .map(|e| e.score)
    }

    pub fn cycles_used(&self) -> u32 {
        self.history.evaluations().len() as u32
    }
}

/// Drafts, evaluates and decides, one call in flight at a time.
pub struct RefinementLoop {
    gateway: Arc<dyn ModelGateway>,
    drafter: BackendId,
    evaluator: BackendId,
    policy: LoopPolicy,
    word_limit: usize,
    draft_retry_limit: u32,
}

impl RefinementLoop {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        drafter: BackendId,
        evaluator: BackendId,
        policy: LoopPolicy,
        word_limit: usize,
        draft_retry_limit: u32,
    ) -> Self {
        Self {
            gateway,
            drafter,
            evaluator,
            policy,
            word_limit,
            draft_retry_limit,
        }
    }

    /// Run until accepted, plateaued or out of cycles.
    ///
    /// `criteria` is fixed for the whole run. Drafting and evaluation
    /// failures end the loop with an error; everything else is a terminal
    /// [`RefinementOutcome`].
    #[instrument(skip_all, fields(idea_id = %idea.id, format = %criteria.format))]
    pub async fn run(
        &self,
        topic: &Topic,
        idea: &Idea,
        criteria: &Criteria,
        tracker: &mut ProvenanceTracker,
    ) -> RefinementResult<RefinementOutcome> {
        let mut state = RefinementState::new();

        loop {
            let cycle = state.cycle;
            METRICS.inc_refinement_cycles();
            debug!(cycle, "drafting");

            let draft = match self.draft(topic, idea, criteria, &state, tracker).await {
                Ok(draft) => draft,
                Err(err) => {
                    self.transition(
                        tracker,
                        cycle,
                        LoopState::Drafting,
                        LoopState::DraftFailed,
                        &self.drafter,
                        None::<&()>,
                    );
                    return Err(err);
                }
            };
            self.transition(
                tracker,
                cycle,
                LoopState::Drafting,
                LoopState::Evaluating,
                &self.drafter,
                Some(&draft),
            );

            let evaluation = self.evaluate(topic, criteria, &draft, tracker).await?;
            let version = draft.version;
            state.push_draft(draft);

            let non_improving = state.convergence.observe(
                version,
                evaluation.score,
                self.policy.plateau_threshold,
            );
            let next = self.policy.decide(cycle, evaluation.passed, non_improving);
            info!(
                cycle,
                score = evaluation.score,
                passed = evaluation.passed,
                non_improving,
                next = %next,
                "draft evaluated"
            );
            self.transition(
                tracker,
                cycle,
                LoopState::Evaluating,
                next,
                &self.evaluator,
                Some(&evaluation),
            );
            state.push_evaluation(evaluation);

            let Some(terminal) = LoopExit::from_state(next) else {
                state.cycle += 1;
                continue;
            };
            let chosen_version = if terminal == LoopExit::Accepted {
                Some(version)
            } else {
                state.convergence.best_version()
            };
            return Ok(RefinementOutcome {
                terminal,
                chosen_version,
                history: state,
            });
        }
    }

    async fn draft(
        &self,
        topic: &Topic,
        idea: &Idea,
        criteria: &Criteria,
        state: &RefinementState,
        tracker: &mut ProvenanceTracker,
    ) -> RefinementResult<Draft> {
        let cycle = state.cycle;
        let attempts = self.draft_retry_limit + 1;
        let mut rejected_word_count = None;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let prompt = Prompt::new(
                Task::Draft,
                self.draft_context(topic, idea, criteria, state, rejected_word_count),
            );

            let result = invoke_counted(self.gateway.as_ref(), &self.drafter, &prompt)
                .await
                .and_then(|value| {
                    let out: DraftOutput = decode(&value, Task::Draft.schema())?;
                    if out.text.trim().is_empty() {
                        return Err(InvocationError::schema_violation(
                            Task::Draft.schema(),
                            "empty draft text",
                        ));
                    }
                    Ok(out)
                });

            let out = match result {
                Ok(out) => out,
                Err(error) => {
                    warn!(cycle, attempt, error = %error, "draft invocation failed");
                    tracker.append(
                        EntryDraft::new(
                            Stage::Refinement,
                            ProvenanceEvent::InvocationFailed {
                                task: Task::Draft,
                                idea_id: Some(idea.id.clone()),
                                error: error.clone(),
                            },
                        )
                        .backend(&self.drafter)
                        .cycle(cycle)
                        .input(&prompt),
                    );
                    last_error = error.to_string();
                    continue;
                }
            };

            let words = word_count(&out.text);
            if words > self.word_limit {
                warn!(cycle, attempt, words, limit = self.word_limit, "draft over word limit");
                tracker.append(
                    EntryDraft::new(
                        Stage::Refinement,
                        ProvenanceEvent::DraftRejected {
                            attempt,
                            word_count: words,
                            word_limit: self.word_limit,
                        },
                    )
                    .backend(&self.drafter)
                    .cycle(cycle)
                    .input(&prompt)
                    .output(&out.text),
                );
                rejected_word_count = Some(words);
                last_error = format!("{words} words exceeds limit of {}", self.word_limit);
                continue;
            }

            let draft = Draft {
                version: state.next_version(),
                cycle_index: cycle,
                text: out.text,
                explainer: out.explainer,
                word_count: words,
                producing_backend: self.drafter.clone(),
                parent_version: state.latest_draft().map(|d| d.version),
            };
            tracker.append(
                EntryDraft::new(
                    Stage::Refinement,
                    ProvenanceEvent::DraftProduced {
                        version: draft.version,
                        word_count: draft.word_count,
                        parent_version: draft.parent_version,
                    },
                )
                .backend(&self.drafter)
                .cycle(cycle)
                .input(&prompt)
                .output(&draft),
            );
            return Ok(draft);
        }

        Err(RefinementError::DraftFailed {
            cycle,
            attempts,
            last_error,
        })
    }

    fn draft_context(
        &self,
        topic: &Topic,
        idea: &Idea,
        criteria: &Criteria,
        state: &RefinementState,
        rejected_word_count: Option<usize>,
    ) -> Value {
        json!({
            "topic": topic.text(),
            "intent": topic.intent(),
            "outline": topic.outline(),
            "idea": idea,
            "criteria": criteria,
            "word_limit": self.word_limit,
            "cycle": state.cycle,
            "previous_draft": state.latest_draft().map(|d| d.text.as_str()),
            "critique": state.last_evaluation().map(|e| e.critique.as_slice()),
            "rejected_word_count": rejected_word_count,
        })
    }

    async fn evaluate(
        &self,
        topic: &Topic,
        criteria: &Criteria,
        draft: &Draft,
        tracker: &mut ProvenanceTracker,
    ) -> RefinementResult<Evaluation> {
        let cycle = draft.cycle_index;
        let prompt = Prompt::new(
            Task::Evaluate,
            json!({
                "topic": topic.text(),
                "criteria": criteria,
                "word_limit": self.word_limit,
                "draft": {
                    "text": draft.text,
                    "explainer": draft.explainer,
                    "word_count": draft.word_count,
                },
            }),
        );

        let result = invoke_counted(self.gateway.as_ref(), &self.evaluator, &prompt)
            .await
            .and_then(|value| {
                let out: EvaluationOutput = decode(&value, Task::Evaluate.schema())?;
                check_score("score", out.score)
                    .map_err(|e| InvocationError::schema_violation(Task::Evaluate.schema(), e))?;
                Ok(out)
            });

        let out = match result {
            Ok(out) => out,
            Err(error) => {
                warn!(cycle, error = %error, "evaluation failed");
                tracker.append(
                    EntryDraft::new(
                        Stage::Refinement,
                        ProvenanceEvent::InvocationFailed {
                            task: Task::Evaluate,
                            idea_id: None,
                            error: error.clone(),
                        },
                    )
                    .backend(&self.evaluator)
                    .cycle(cycle)
                    .input(&prompt),
                );
                return Err(RefinementError::EvaluationFailed { cycle, error });
            }
        };

        let mut critique = out.critique;
        critique.truncate(MAX_CRITIQUE_ITEMS);
        let evaluation = Evaluation {
            cycle_index: cycle,
            draft_version: draft.version,
            score: out.score,
            passed: out.pass.unwrap_or(out.score >= criteria.minimum_bar),
            critique,
            criterion_scores: out.criterion_scores,
            producing_backend: self.evaluator.clone(),
        };

        tracker.append(
            EntryDraft::new(
                Stage::Refinement,
                ProvenanceEvent::Evaluated {
                    draft_version: evaluation.draft_version,
                    score: evaluation.score,
                    passed: evaluation.passed,
                },
            )
            .backend(&self.evaluator)
            .cycle(cycle)
            .input(&prompt)
            .output(&evaluation),
        );
        Ok(evaluation)
    }

    fn transition<T: serde::Serialize>(
        &self,
        tracker: &mut ProvenanceTracker,
        cycle: u32,
        from: LoopState,
        to: LoopState,
        backend: &BackendId,
        artifact: Option<&T>,
    ) {
        emit_loop_transition(cycle, &from.to_string(), &to.to_string());
        let mut entry =
            EntryDraft::new(Stage::Refinement, ProvenanceEvent::LoopTransition { from, to })
                .backend(backend)
                .cycle(cycle);
        if let Some(artifact) = artifact {
            entry = entry.output(artifact);
        }
        tracker.append(entry);
    }
}
