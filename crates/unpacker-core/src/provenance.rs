//! Append-only provenance log for a run.
//!
//! Every stage writes here: which backend produced which artifact, when,
//! and the digests of what went in and came out. Entries are never mutated
//! or removed once appended, and carry a typed [`ProvenanceEvent`] so the
//! log alone is enough to replay the run's decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::checkpoint::Decision;
use crate::config::Tunables;
use crate::domain::digest::digest_of;
use crate::domain::{IdeaId, OutputFormat};
use crate::failure_analysis::FailureCause;
use crate::gateway::{BackendId, InvocationError, Task};
use crate::refinement::LoopState;
use crate::sequencer::RunStatus;

/// Pipeline stage an entry was written by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Setup,
    IdeaGeneration,
    Scoring,
    Checkpoint,
    CriteriaFormatting,
    Refinement,
    FailureAnalysis,
    Output,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Setup => "setup",
            Self::IdeaGeneration => "idea_generation",
            Self::Scoring => "scoring",
            Self::Checkpoint => "checkpoint",
            Self::CriteriaFormatting => "criteria_formatting",
            Self::Refinement => "refinement",
            Self::FailureAnalysis => "failure_analysis",
            Self::Output => "output",
        };
        f.write_str(s)
    }
}

/// What happened, in replayable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProvenanceEvent {
    RunStarted {
        run_id: String,
        topic: String,
        tunables: Tunables,
    },
    IdeasGenerated {
        count: usize,
    },
    InvocationFailed {
        task: Task,
        idea_id: Option<IdeaId>,
        error: InvocationError,
    },
    ScoreRecorded {
        idea_id: IdeaId,
        score: f64,
    },
    ScoreSummarized {
        idea_id: IdeaId,
        mean_score: f64,
        divergence: f64,
        flagged: bool,
        succeeded: usize,
        failed: usize,
    },
    IdeaSelected {
        idea_id: IdeaId,
    },
    CheckpointDecided {
        round: u32,
        decision: Decision,
    },
    CriteriaFormatted {
        format: OutputFormat,
        criteria: Vec<String>,
        minimum_bar: f64,
    },
    DraftProduced {
        version: u32,
        word_count: usize,
        parent_version: Option<u32>,
    },
    DraftRejected {
        attempt: u32,
        word_count: usize,
        word_limit: usize,
    },
    Evaluated {
        draft_version: u32,
        score: f64,
        passed: bool,
    },
    LoopTransition {
        from: LoopState,
        to: LoopState,
    },
    FailureAnalyzed {
        likely_cause: FailureCause,
        best_draft_version: Option<u32>,
    },
    DiagnosisSummarized,
    RunFinished {
        status: RunStatus,
        best_draft_version: Option<u32>,
    },
}

impl ProvenanceEvent {
    /// Snake-case tag of this event, as serialized.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::IdeasGenerated { .. } => "ideas_generated",
            Self::InvocationFailed { .. } => "invocation_failed",
            Self::ScoreRecorded { .. } => "score_recorded",
            Self::ScoreSummarized { .. } => "score_summarized",
            Self::IdeaSelected { .. } => "idea_selected",
            Self::CheckpointDecided { .. } => "checkpoint_decided",
            Self::CriteriaFormatted { .. } => "criteria_formatted",
            Self::DraftProduced { .. } => "draft_produced",
            Self::DraftRejected { .. } => "draft_rejected",
            Self::Evaluated { .. } => "evaluated",
            Self::LoopTransition { .. } => "loop_transition",
            Self::FailureAnalyzed { .. } => "failure_analyzed",
            Self::DiagnosisSummarized => "diagnosis_summarized",
            Self::RunFinished { .. } => "run_finished",
        }
    }
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    /// Position in the log; contiguous from 0.
    pub seq: u64,
    pub stage: Stage,
    /// Producing backend; `None` for core or human actions.
    pub backend: Option<BackendId>,
    pub recorded_at: DateTime<Utc>,
    pub cycle_index: Option<u32>,
    pub input_digest: Option<String>,
    pub output_digest: Option<String>,
    pub event: ProvenanceEvent,
}

/// An entry waiting for its sequence number.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    stage: Stage,
    backend: Option<BackendId>,
    recorded_at: Option<DateTime<Utc>>,
    cycle_index: Option<u32>,
    input_digest: Option<String>,
    output_digest: Option<String>,
    event: ProvenanceEvent,
}

impl EntryDraft {
    pub fn new(stage: Stage, event: ProvenanceEvent) -> Self {
        Self {
            stage,
            backend: None,
            recorded_at: None,
            cycle_index: None,
            input_digest: None,
            output_digest: None,
            event,
        }
    }

    pub fn backend(mut self, backend: &BackendId) -> Self {
        self.backend = Some(backend.clone());
        self
    }

    pub fn cycle(mut self, cycle_index: u32) -> Self {
        self.cycle_index = Some(cycle_index);
        self
    }

    /// Timestamp of when the work happened, if earlier than the append.
    pub fn at(mut self, when: DateTime<Utc>) -> Self {
        self.recorded_at = Some(when);
        self
    }

    pub fn input<T: Serialize>(mut self, input: &T) -> Self {
        self.input_digest = digest_or_warn(input);
        self
    }

    pub fn output<T: Serialize>(mut self, output: &T) -> Self {
        self.output_digest = digest_or_warn(output);
        self
    }
}

fn digest_or_warn<T: Serialize>(value: &T) -> Option<String> {
    match digest_of(value) {
        Ok(d) => Some(d),
        Err(e) => {
            warn!(error = %e, "could not digest provenance payload");
            None
        }
    }
}

/// Append-only provenance store for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvenanceTracker {
    entries: Vec<ProvenanceEntry>,
}

impl ProvenanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return its sequence number.
    pub fn append(&mut self, draft: EntryDraft) -> u64 {
        let seq = self.entries.len() as u64;
        debug!(seq, stage = %draft.stage, kind = draft.event.kind(), "provenance appended");
        self.entries.push(ProvenanceEntry {
            seq,
            stage: draft.stage,
            backend: draft.backend,
            recorded_at: draft.recorded_at.unwrap_or_else(Utc::now),
            cycle_index: draft.cycle_index,
            input_digest: draft.input_digest,
            output_digest: draft.output_digest,
            event: draft.event,
        });
        seq
    }

    pub fn entries(&self) -> &[ProvenanceEntry] {
        &self.entries
    }

    /// Entries written by one stage, in order.
    pub fn for_stage(&self, stage: Stage) -> Vec<&ProvenanceEntry> {
        self.entries.iter().filter(|e| e.stage == stage).collect()
    }

    /// Entries tagged with a refinement cycle, in order.
    pub fn for_cycle(&self, cycle_index: u32) -> Vec<&ProvenanceEntry> {
        self.entries
            .iter()
            .filter(|e| e.cycle_index == Some(cycle_index))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
