//! Diagnosis for runs that spent their cycle budget without acceptance.
//!
//! [`analyze`] is a pure function over the retained history. [`summarize`]
//! optionally asks one backend to put the trajectory into words; its failure
//! leaves the numeric report untouched.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::domain::Criteria;
use crate::gateway::{decode, invoke_counted, BackendId, ModelGateway, Prompt, Task};
use crate::provenance::{EntryDraft, ProvenanceEvent, ProvenanceTracker, Stage};
use crate::refinement::RefinementState;

/// Most likely reason the loop did not converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// Even the best draft scored under half the bar.
    WeakIdea,
    /// Later drafts scored worse than the first.
    Regressing,
    /// Scores were still climbing when cycles ran out.
    BudgetExhausted,
    /// Scores barely moved between drafts.
    ExecutionStalled,
    /// Respectable, moving scores that never reached the bar.
    BarUnrealistic,
}

impl FailureCause {
    /// One-line suggestion for the next attempt.
    pub fn hint(self) -> &'static str {
        match self {
            Self::WeakIdea => "pick a different idea; this angle does not carry the format",
            Self::Regressing => "the critique pulled drafts away from what worked; revise the criteria",
            Self::BudgetExhausted => "allow more refinement cycles",
            Self::ExecutionStalled => "try a different output format or drafting backend",
            Self::BarUnrealistic => "lower the minimum bar or loosen the criteria",
        }
    }
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::WeakIdea => "weak_idea",
            Self::Regressing => "regressing",
            Self::BudgetExhausted => "budget_exhausted",
            Self::ExecutionStalled => "execution_stalled",
            Self::BarUnrealistic => "bar_unrealistic",
        };
        f.write_str(s)
    }
}

/// Structured diagnosis of a non-converging run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub likely_cause: FailureCause,
    pub best_draft_version: Option<u32>,
    pub best_score: Option<f64>,
    pub minimum_bar: f64,
    pub score_trajectory: Vec<f64>,
    /// Natural-language diagnosis, when a backend supplied one.
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiagnosisOutput {
    summary: String,
}

/// Classify a score trajectory. First matching cause wins.
pub fn classify(trajectory: &[f64], minimum_bar: f64, plateau_threshold: f64) -> FailureCause {
    let (Some(&first), Some(&last)) = (trajectory.first(), trajectory.last()) else {
        return FailureCause::ExecutionStalled;
    };
    let max = trajectory.iter().copied().fold(f64::MIN, f64::max);
    let min = trajectory.iter().copied().fold(f64::MAX, f64::min);
    let non_decreasing = trajectory.windows(2).all(|w| w[1] >= w[0]);

    if max < minimum_bar / 2.0 {
        FailureCause::WeakIdea
    } else if last < first - plateau_threshold {
        FailureCause::Regressing
    } else if non_decreasing && last - first > plateau_threshold {
        FailureCause::BudgetExhausted
    } else if max - min <= plateau_threshold {
        FailureCause::ExecutionStalled
    } else {
        FailureCause::BarUnrealistic
    }
}

/// Build the numeric report for `history`.
pub fn analyze(history: &RefinementState, criteria: &Criteria, plateau_threshold: f64) -> FailureReport {
    let trajectory = history.trajectory();
    FailureReport {
        likely_cause: classify(&trajectory, criteria.minimum_bar, plateau_threshold),
        best_draft_version: history.convergence.best_version(),
        best_score: history.convergence.best_score(),
        minimum_bar: criteria.minimum_bar,
        score_trajectory: trajectory,
        summary: None,
    }
}

/// Ask `backend` for a short diagnosis and attach it to `report`.
///
/// Best-effort: any failure is logged and recorded, and the report is
/// returned without a summary.
#[instrument(skip_all, fields(backend = %backend, cause = %report.likely_cause))]
pub async fn summarize(
    mut report: FailureReport,
    history: &RefinementState,
    gateway: &dyn ModelGateway,
    backend: &BackendId,
    tracker: &mut ProvenanceTracker,
) -> FailureReport {
    let critiques: Vec<&[String]> = history
        .evaluations()
        .iter()
        .map(|e| e.critique.as_slice())
        .collect();
    let prompt = Prompt::new(
        Task::DiagnoseFailure,
        json!({
            "likely_cause": report.likely_cause,
            "score_trajectory": report.score_trajectory,
            "minimum_bar": report.minimum_bar,
            "best_score": report.best_score,
            "critiques": critiques,
        }),
    );

    let result = invoke_counted(gateway, backend, &prompt)
        .await
        .and_then(|value| decode::<DiagnosisOutput>(&value, Task::DiagnoseFailure.schema()));

    match result {
        Ok(out) => {
            info!("diagnosis summarized");
            tracker.append(
                EntryDraft::new(Stage::FailureAnalysis, ProvenanceEvent::DiagnosisSummarized)
                    .backend(backend)
                    .input(&prompt)
                    .output(&out.summary),
            );
            report.summary = Some(out.summary);
        }
        Err(error) => {
            warn!(error = %error, "diagnosis unavailable, keeping numeric report");
            tracker.append(
                EntryDraft::new(
                    Stage::FailureAnalysis,
                    ProvenanceEvent::InvocationFailed {
                        task: Task::DiagnoseFailure,
                        idea_id: None,
                        error,
                    },
                )
                .backend(backend)
                .input(&prompt),
            );
        }
    }
    report
}
