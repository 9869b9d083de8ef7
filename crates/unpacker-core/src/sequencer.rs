//! Top-level pipeline driver.
//!
//! ```text
//! GenerateIdeas -> ParallelScorer (per idea) -> select -> CheckpointGate
//!   -> FormatCriteria -> RefinementLoop -> Output | FailureReport | UserAborted
//! ```
//!
//! The caller owns the [`ProvenanceTracker`] so the trace is still there when
//! a stage fails.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, Instrument};

use crate::checkpoint::{CheckpointError, CheckpointGate, CheckpointState, Decision, HumanInterface};
use crate::config::{ConfigError, PipelineConfig};
use crate::domain::{
    Criteria, CriteriaDraft, CriteriaRevision, Idea, IdeaDraft, IdeaId, IdeaSet, Topic,
    ValidationError,
};
use crate::failure_analysis::{analyze, summarize, FailureReport};
use crate::gateway::{decode, invoke_counted, BackendId, InvocationError, ModelGateway, Prompt, Task};
use crate::metrics::METRICS;
use crate::obs::{
    emit_run_failed, emit_run_finished, emit_run_started, emit_stage_completed, run_span,
};
use crate::provenance::{EntryDraft, ProvenanceEntry, ProvenanceEvent, ProvenanceTracker, Stage};
use crate::refinement::{LoopExit, LoopPolicy, RefinementError, RefinementLoop, RefinementOutcome};
use crate::scoring::{ParallelScorer, ScoreSummary, ScoringError};

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Accepted,
    PlateauStopped,
    CycleExhausted,
    UserAborted,
}

impl From<LoopExit> for RunStatus {
    fn from(exit: LoopExit) -> Self {
        match exit {
            LoopExit::Accepted => Self::Accepted,
            LoopExit::PlateauStopped => Self::PlateauStopped,
            LoopExit::CycleExhausted => Self::CycleExhausted,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Accepted => "accepted",
            Self::PlateauStopped => "plateau_stopped",
            Self::CycleExhausted => "cycle_exhausted",
            Self::UserAborted => "user_aborted",
        };
        f.write_str(s)
    }
}

/// Record handed back to the caller at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub run_id: String,
    pub status: RunStatus,
    pub topic: Topic,
    pub score_summaries: Vec<ScoreSummary>,
    pub selected_idea: Option<Idea>,
    pub criteria: Option<Criteria>,
    pub final_text: Option<String>,
    pub explainer: Option<String>,
    pub final_score: Option<f64>,
    pub best_draft_version: Option<u32>,
    pub cycles_used: u32,
    pub score_trajectory: Option<Vec<f64>>,
    pub failure_report: Option<FailureReport>,
    pub provenance_log: Vec<ProvenanceEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Why a stage could not complete.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Refinement(#[from] RefinementError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("idea generation returned no ideas")]
    NoIdeas,
}

/// Errors that end a run without output.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("stage {stage} failed: {source}")]
    StageFailed {
        stage: Stage,
        #[source]
        source: StageError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl PipelineError {
    fn at(stage: Stage) -> impl FnOnce(StageError) -> Self {
        move |source| Self::StageFailed { stage, source }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::StageFailed { stage, .. } => Some(*stage),
            Self::InvalidConfig(_) => None,
        }
    }
}

/// Result type for pipeline runs.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdeaListOutput {
    List(Vec<IdeaDraft>),
    Wrapped { ideas: Vec<IdeaDraft> },
}

/// Everything the checkpoint produced that later stages need.
struct CheckpointOutcome {
    idea: Idea,
    criteria: Criteria,
}

/// Composes every stage into one run.
pub struct StageSequencer {
    gateway: Arc<dyn ModelGateway>,
    human: Arc<dyn HumanInterface>,
    config: PipelineConfig,
}

impl StageSequencer {
    /// Validate `config` once; it is read-only afterwards.
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        human: Arc<dyn HumanInterface>,
        config: PipelineConfig,
    ) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self {
            gateway,
            human,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the whole pipeline for `topic`.
    pub async fn run(
        &self,
        topic: Topic,
        tracker: &mut ProvenanceTracker,
    ) -> PipelineResult<PipelineOutput> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = run_span(&run_id);
        let started = Instant::now();

        let result = self
            .run_stages(&run_id, topic, tracker)
            .instrument(span)
            .await;

        match &result {
            Ok(output) => emit_run_finished(
                &run_id,
                &output.status.to_string(),
                started.elapsed().as_millis() as u64,
                tracker.len() as u64,
            ),
            Err(err) => emit_run_failed(&run_id, err),
        }
        METRICS.flush();
        result
    }

    async fn run_stages(
        &self,
        run_id: &str,
        topic: Topic,
        tracker: &mut ProvenanceTracker,
    ) -> PipelineResult<PipelineOutput> {
        let started_at = Utc::now();
        emit_run_started(run_id, topic.text());
        tracker.append(
            EntryDraft::new(
                Stage::Setup,
                ProvenanceEvent::RunStarted {
                    run_id: run_id.to_string(),
                    topic: topic.text().to_string(),
                    tunables: self.config.tunables(),
                },
            )
            .input(&topic),
        );

        let ideas = self
            .generate_ideas(&topic, tracker)
            .await
            .map_err(PipelineError::at(Stage::IdeaGeneration))?;
        emit_stage_completed("idea_generation", &format!("{} ideas", ideas.len()));

        let summaries = self
            .score_ideas(&topic, &ideas, tracker)
            .await
            .map_err(PipelineError::at(Stage::Scoring))?;
        let selected = select_top(&summaries).ok_or(PipelineError::StageFailed {
            stage: Stage::Scoring,
            source: StageError::NoIdeas,
        })?;
        tracker.append(EntryDraft::new(
            Stage::Scoring,
            ProvenanceEvent::IdeaSelected {
                idea_id: selected.clone(),
            },
        ));
        emit_stage_completed("scoring", selected.as_str());

        let mut output = PipelineOutput {
            run_id: run_id.to_string(),
            status: RunStatus::UserAborted,
            topic: topic.clone(),
            score_summaries: summaries.clone(),
            selected_idea: ideas.get(&selected).cloned(),
            criteria: None,
            final_text: None,
            explainer: None,
            final_score: None,
            best_draft_version: None,
            cycles_used: 0,
            score_trajectory: None,
            failure_report: None,
            provenance_log: Vec::new(),
            started_at,
            finished_at: started_at,
        };

        let checkpoint = self
            .checkpoint(&topic, &ideas, summaries, selected, tracker)
            .await?;
        let Some(CheckpointOutcome { idea, criteria }) = checkpoint else {
            info!("run aborted at checkpoint");
            return Ok(self.finish(output, tracker));
        };
        output.selected_idea = Some(idea.clone());
        output.criteria = Some(criteria.clone());

        let refinement = RefinementLoop::new(
            Arc::clone(&self.gateway),
            self.config.backends.drafter.clone(),
            self.config.backends.evaluator.clone(),
            LoopPolicy::from_tunables(&self.config.tunables()),
            self.config.word_limit,
            self.config.draft_retry_limit,
        );
        let outcome = refinement
            .run(&topic, &idea, &criteria, tracker)
            .await
            .map_err(|e| PipelineError::StageFailed {
                stage: Stage::Refinement,
                source: e.into(),
            })?;
        emit_stage_completed("refinement", &outcome.terminal.to_string());

        self.apply_outcome(&mut output, &outcome, &criteria, tracker)
            .await;
        Ok(self.finish(output, tracker))
    }

    #[instrument(skip_all)]
    async fn generate_ideas(
        &self,
        topic: &Topic,
        tracker: &mut ProvenanceTracker,
    ) -> Result<IdeaSet, StageError> {
        let backend = &self.config.backends.generator;
        let prompt = Prompt::new(
            Task::GenerateIdeas,
            json!({
                "topic": topic.text(),
                "intent": topic.intent(),
                "outline": topic.outline(),
            }),
        );

        let result = invoke_counted(self.gateway.as_ref(), backend, &prompt)
            .await
            .and_then(|value| {
                let list: IdeaListOutput = decode(&value, Task::GenerateIdeas.schema())?;
                Ok((value, list))
            });
        let (value, list) = match result {
            Ok(pair) => pair,
            Err(error) => {
                record_failure(
                    tracker,
                    Stage::IdeaGeneration,
                    backend,
                    Task::GenerateIdeas,
                    &prompt,
                    &error,
                );
                return Err(error.into());
            }
        };

        let drafts = match list {
            IdeaListOutput::List(ideas) | IdeaListOutput::Wrapped { ideas } => ideas,
        };
        let ideas = IdeaSet::from_drafts(drafts);
        tracker.append(
            EntryDraft::new(
                Stage::IdeaGeneration,
                ProvenanceEvent::IdeasGenerated { count: ideas.len() },
            )
            .backend(backend)
            .input(&prompt)
            .output(&value),
        );

        if ideas.is_empty() {
            return Err(StageError::NoIdeas);
        }
        Ok(ideas)
    }

    /// Ideas are scored one after another; each fans out across scorers.
    async fn score_ideas(
        &self,
        topic: &Topic,
        ideas: &IdeaSet,
        tracker: &mut ProvenanceTracker,
    ) -> Result<Vec<ScoreSummary>, StageError> {
        let scorer = ParallelScorer::new(
            Arc::clone(&self.gateway),
            self.config.score_divergence_threshold,
        );
        let mut summaries = Vec::with_capacity(ideas.len());
        for idea in ideas {
            let summary = scorer
                .score(topic, idea, &self.config.backends.scorers, tracker)
                .await?;
            summaries.push(summary);
        }
        Ok(summaries)
    }

    /// Present, revise and re-present until approved or aborted.
    ///
    /// `None` means the human aborted.
    async fn checkpoint(
        &self,
        topic: &Topic,
        ideas: &IdeaSet,
        summaries: Vec<ScoreSummary>,
        mut selected: IdeaId,
        tracker: &mut ProvenanceTracker,
    ) -> PipelineResult<Option<CheckpointOutcome>> {
        let gate = CheckpointGate::new(
            Arc::clone(&self.human),
            self.config.max_checkpoint_rounds,
        );
        let mut state = CheckpointState {
            round: 1,
            topic: topic.clone(),
            ideas: ideas.clone(),
            summaries,
            selected: selected.clone(),
            pending_criteria: None,
        };

        loop {
            let decision = gate
                .present(&state, tracker)
                .await
                .map_err(|e| PipelineError::StageFailed {
                    stage: Stage::Checkpoint,
                    source: e.into(),
                })?;

            let revision = match decision {
                Decision::Abort => return Ok(None),
                Decision::Approve => {
                    let idea = self.idea(ideas, &selected)?;
                    let criteria = match state.pending_criteria.take() {
                        Some(criteria) => criteria,
                        None => self
                            .format_criteria(topic, &idea, None, tracker)
                            .await
                            .map_err(PipelineError::at(Stage::CriteriaFormatting))?,
                    };
                    return Ok(Some(CheckpointOutcome { idea, criteria }));
                }
                Decision::Revise { revision } => revision,
            };

            if let Some(id) = &revision.idea {
                if id != &selected {
                    selected = id.clone();
                    tracker.append(EntryDraft::new(
                        Stage::Checkpoint,
                        ProvenanceEvent::IdeaSelected {
                            idea_id: selected.clone(),
                        },
                    ));
                }
            }
            let idea = self.idea(ideas, &selected)?;
            let criteria = self
                .format_criteria(topic, &idea, Some(&revision), tracker)
                .await
                .map_err(PipelineError::at(Stage::CriteriaFormatting))?;

            state.round += 1;
            state.selected = selected.clone();
            state.pending_criteria = Some(criteria);
        }
    }

    fn idea(&self, ideas: &IdeaSet, id: &IdeaId) -> PipelineResult<Idea> {
        ideas.get(id).cloned().ok_or_else(|| PipelineError::StageFailed {
            stage: Stage::Checkpoint,
            source: CheckpointError::UnknownIdea(id.clone()).into(),
        })
    }

    /// Ask the formatter for a rubric, applying `revision` on top if given.
    #[instrument(skip_all, fields(idea_id = %idea.id, revised = revision.is_some()))]
    async fn format_criteria(
        &self,
        topic: &Topic,
        idea: &Idea,
        revision: Option<&CriteriaRevision>,
        tracker: &mut ProvenanceTracker,
    ) -> Result<Criteria, StageError> {
        let backend = &self.config.backends.formatter;
        let floor = self.config.minimum_bar_floor;
        let prompt = Prompt::new(
            Task::FormatCriteria,
            json!({
                "topic": topic.text(),
                "intent": topic.intent(),
                "idea": idea,
                "word_limit": self.config.word_limit,
                "revision": revision,
            }),
        );

        let result = invoke_counted(self.gateway.as_ref(), backend, &prompt)
            .await
            .and_then(|value| {
                let draft: CriteriaDraft = decode(&value, Task::FormatCriteria.schema())?;
                Criteria::new(
                    draft.format,
                    draft.rationale,
                    draft.criteria,
                    draft.minimum_bar,
                    floor,
                )
                .map_err(|e| InvocationError::schema_violation(Task::FormatCriteria.schema(), e))
            });
        let formatted = match result {
            Ok(criteria) => criteria,
            Err(error) => {
                record_failure(
                    tracker,
                    Stage::CriteriaFormatting,
                    backend,
                    Task::FormatCriteria,
                    &prompt,
                    &error,
                );
                return Err(error.into());
            }
        };

        let criteria = match revision {
            Some(revision) => formatted.revised(revision, floor)?,
            None => formatted,
        };
        tracker.append(
            EntryDraft::new(
                Stage::CriteriaFormatting,
                ProvenanceEvent::CriteriaFormatted {
                    format: criteria.format,
                    criteria: criteria.criteria.clone(),
                    minimum_bar: criteria.minimum_bar,
                },
            )
            .backend(backend)
            .input(&prompt)
            .output(&criteria),
        );
        emit_stage_completed("criteria_formatting", &criteria.format.to_string());
        Ok(criteria)
    }

    async fn apply_outcome(
        &self,
        output: &mut PipelineOutput,
        outcome: &RefinementOutcome,
        criteria: &Criteria,
        tracker: &mut ProvenanceTracker,
    ) {
        output.status = outcome.terminal.into();
        output.cycles_used = outcome.cycles_used();
        output.score_trajectory = Some(outcome.history.trajectory());
        output.best_draft_version = outcome.chosen_version;
        output.final_score = outcome.chosen_score();
        if let Some(draft) = outcome.chosen_draft() {
            output.final_text = Some(draft.text.clone());
            output.explainer = Some(draft.explainer.clone());
        }

        if output.status != RunStatus::CycleExhausted {
            return;
        }

        let mut report = analyze(&outcome.history, criteria, self.config.plateau_threshold);
        tracker.append(
            EntryDraft::new(
                Stage::FailureAnalysis,
                ProvenanceEvent::FailureAnalyzed {
                    likely_cause: report.likely_cause,
                    best_draft_version: report.best_draft_version,
                },
            )
            .output(&report),
        );
        if let Some(analyst) = &self.config.backends.analyst {
            report = summarize(
                report,
                &outcome.history,
                self.gateway.as_ref(),
                analyst,
                tracker,
            )
            .await;
        }
        emit_stage_completed("failure_analysis", &report.likely_cause.to_string());
        output.failure_report = Some(report);
    }

    fn finish(&self, mut output: PipelineOutput, tracker: &mut ProvenanceTracker) -> PipelineOutput {
        tracker.append(EntryDraft::new(
            Stage::Output,
            ProvenanceEvent::RunFinished {
                status: output.status,
                best_draft_version: output.best_draft_version,
            },
        ));
        output.finished_at = Utc::now();
        output.provenance_log = tracker.entries().to_vec();
        output
    }
}

/// Highest mean score; the earliest idea wins a tie.
pub fn select_top(summaries: &[ScoreSummary]) -> Option<IdeaId> {
    let mut best: Option<&ScoreSummary> = None;
    for summary in summaries {
        if best.map_or(true, |b| summary.mean_score > b.mean_score) {
            best = Some(summary);
        }
    }
    best.map(|s| s.idea_id.clone())
}

fn record_failure(
    tracker: &mut ProvenanceTracker,
    stage: Stage,
    backend: &BackendId,
    task: Task,
    prompt: &Prompt,
    error: &InvocationError,
) {
    tracing::warn!(stage = %stage, backend = %backend, error = %error, "stage invocation failed");
    tracker.append(
        EntryDraft::new(
            stage,
            ProvenanceEvent::InvocationFailed {
                task,
                idea_id: None,
                error: error.clone(),
            },
        )
        .backend(backend)
        .input(prompt),
    );
}
