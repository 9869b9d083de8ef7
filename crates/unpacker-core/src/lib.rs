//! Idea Unpacker Core Library
//!
//! Orchestration for turning a topic into a short written artifact through
//! several model backends: idea generation, parallel scoring with divergence
//! detection, a human checkpoint, a bounded refinement loop and failure
//! analysis, all recorded in a replayable provenance log.

pub mod checkpoint;
pub mod config;
pub mod domain;
pub mod failure_analysis;
pub mod fakes;
pub mod gateway;
pub mod metrics;
pub mod obs;
pub mod provenance;
pub mod refinement;
pub mod replay;
pub mod reporting;
pub mod scoring;
pub mod sequencer;
pub mod telemetry;

pub use checkpoint::{CheckpointError, CheckpointGate, CheckpointState, Decision, HumanInterface};
pub use config::{BackendRoster, ConfigError, ConfigProvider, PipelineConfig, StaticConfig, Tunables};
pub use domain::{
    Criteria, CriteriaRevision, Draft, Evaluation, Idea, IdeaId, IdeaSet, OutputFormat, Result,
    Topic, UnpackerError, ValidationError,
};
pub use failure_analysis::{analyze, FailureCause, FailureReport};
pub use gateway::{BackendId, InvocationError, ModelGateway, OutputSchema, Prompt, Structured, Task};
pub use provenance::{ProvenanceEntry, ProvenanceEvent, ProvenanceTracker, Stage};
pub use refinement::{
    LoopExit, LoopPolicy, LoopState, RefinementError, RefinementLoop, RefinementOutcome,
};
pub use replay::{replay, ReplayError, ReplaySummary};
pub use reporting::{read_artifact_file, read_run_artifact, write_run_artifact};
pub use scoring::{ParallelScorer, ScoreRecord, ScoreSummary, ScoringError};
pub use sequencer::{PipelineError, PipelineOutput, RunStatus, StageError, StageSequencer};

pub use metrics::METRICS;
pub use obs::{emit_run_failed, emit_run_finished, emit_run_started, run_span};
pub use telemetry::init_tracing;

/// Idea Unpacker version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
