//! The single call surface every model backend sits behind.
//!
//! The core never formats prompt wording or talks to a vendor API. It builds a
//! [`Prompt`] (a task tag plus structured context), names the [`OutputSchema`]
//! it expects back, and branches only on success or the kind of
//! [`InvocationError`]. Retry and timeout policy belong to the implementor.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::metrics::METRICS;

/// Identifier of a configured backend (e.g. `claude`, `deepseek`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(pub String);

impl BackendId {
    pub fn new(id: impl Into<String>) -> Self {
        BackendId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BackendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pipeline task a prompt is issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    GenerateIdeas,
    ScoreIdea,
    FormatCriteria,
    Draft,
    Evaluate,
    DiagnoseFailure,
}

impl Task {
    /// The output shape this task must produce.
    pub fn schema(self) -> OutputSchema {
        match self {
            Task::GenerateIdeas => OutputSchema::IdeaList,
            Task::ScoreIdea => OutputSchema::Score,
            Task::FormatCriteria => OutputSchema::Criteria,
            Task::Draft => OutputSchema::Draft,
            Task::Evaluate => OutputSchema::Evaluation,
            Task::DiagnoseFailure => OutputSchema::Diagnosis,
        }
    }
}

/// Named structured-output shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSchema {
    /// JSON array of `{name, description, why_underexplored, source, model_generated}`.
    IdeaList,
    /// `{score, rationale}`.
    Score,
    /// `{format, rationale, criteria, minimum_bar}`.
    Criteria,
    /// `{text, explainer}`.
    Draft,
    /// `{score, pass?, critique, criterion_scores?}`.
    Evaluation,
    /// `{summary}`.
    Diagnosis,
}

impl OutputSchema {
    pub fn name(self) -> &'static str {
        match self {
            Self::IdeaList => "idea_list",
            Self::Score => "score",
            Self::Criteria => "criteria",
            Self::Draft => "draft",
            Self::Evaluation => "evaluation",
            Self::Diagnosis => "diagnosis",
        }
    }

    /// Top-level keys an object-shaped output must carry.
    pub fn required_keys(self) -> &'static [&'static str] {
        match self {
            Self::IdeaList => &[],
            Self::Score => &["score"],
            Self::Criteria => &["criteria", "minimum_bar"],
            Self::Draft => &["text"],
            Self::Evaluation => &["score"],
            Self::Diagnosis => &["summary"],
        }
    }
}

impl std::fmt::Display for OutputSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A request to a backend: what to do, and the structured material to do it with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub task: Task,
    pub context: serde_json::Value,
}

impl Prompt {
    pub fn new(task: Task, context: serde_json::Value) -> Self {
        Self { task, context }
    }
}

/// Structured output returned by a backend.
pub type Structured = serde_json::Value;

/// Why a single backend invocation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvocationError {
    #[error("invocation timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("rate limited: {detail}")]
    RateLimited { detail: String },

    #[error("output violated {schema} schema: {detail}")]
    SchemaViolation { schema: String, detail: String },

    #[error("backend unavailable: {detail}")]
    Unavailable { detail: String },
}

impl InvocationError {
    pub fn schema_violation(schema: OutputSchema, detail: impl std::fmt::Display) -> Self {
        Self::SchemaViolation {
            schema: schema.name().to_string(),
            detail: detail.to_string(),
        }
    }

    pub fn unavailable(detail: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            detail: detail.to_string(),
        }
    }
}

/// Uniform model invocation capability.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Run `prompt` on `backend` and return output conforming to `schema`.
    async fn invoke(
        &self,
        backend: &BackendId,
        prompt: &Prompt,
        schema: OutputSchema,
    ) -> Result<Structured, InvocationError>;
}

/// Invoke through the gateway, counting the call and its failure.
pub(crate) async fn invoke_counted(
    gateway: &dyn ModelGateway,
    backend: &BackendId,
    prompt: &Prompt,
) -> Result<Structured, InvocationError> {
    METRICS.inc_invocations();
    let result = gateway.invoke(backend, prompt, prompt.task.schema()).await;
    if result.is_err() {
        METRICS.inc_invocation_failures();
    }
    result
}

/// Decode structured output into a typed value, failing as a schema violation.
pub fn decode<T: DeserializeOwned>(
    value: &Structured,
    schema: OutputSchema,
) -> Result<T, InvocationError> {
    T::deserialize(value).map_err(|e| InvocationError::schema_violation(schema, e))
}
