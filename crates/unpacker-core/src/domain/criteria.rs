//! Acceptance rubric for the refinement loop, and human revisions to it.

use serde::{Deserialize, Serialize};

use super::error::ValidationError;
use super::topic::IdeaId;
use super::{check_score, SCORE_MAX};

/// Maximum number of named criteria in a rubric.
pub const MAX_CRITERIA: usize = 5;

/// The shape the final artifact takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Poem,
    Quotes,
    MicroEssay,
    Aphorisms,
    Dialogue,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Poem => "poem",
            Self::Quotes => "quotes",
            Self::MicroEssay => "micro_essay",
            Self::Aphorisms => "aphorisms",
            Self::Dialogue => "dialogue",
        };
        f.write_str(s)
    }
}

/// Write-once rubric that drafts are evaluated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    pub format: OutputFormat,
    pub rationale: String,
    pub criteria: Vec<String>,
    /// Score an evaluation must reach to count as passing when the
    /// evaluator does not state a pass flag itself.
    pub minimum_bar: f64,
}

impl Criteria {
    /// Validate a rubric and raise its bar to `floor`.
    pub fn new(
        format: OutputFormat,
        rationale: impl Into<String>,
        criteria: Vec<String>,
        minimum_bar: f64,
        floor: f64,
    ) -> Result<Self, ValidationError> {
        let criteria: Vec<String> = criteria
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if criteria.is_empty() {
            return Err(ValidationError::Empty { field: "criteria" });
        }
        if criteria.len() > MAX_CRITERIA {
            return Err(ValidationError::TooLong {
                field: "criteria",
                len: criteria.len(),
                max: MAX_CRITERIA,
            });
        }
        let bar = check_score("minimum_bar", minimum_bar)?;
        Ok(Self {
            format,
            rationale: rationale.into(),
            criteria,
            minimum_bar: bar.max(floor).min(SCORE_MAX),
        })
    }

    /// Apply a human revision on top of this rubric.
    pub fn revised(&self, revision: &CriteriaRevision, floor: f64) -> Result<Self, ValidationError> {
        let criteria = if revision.criteria.is_empty() {
            self.criteria.clone()
        } else {
            revision.criteria.clone()
        };
        Self::new(
            revision.format.unwrap_or(self.format),
            self.rationale.clone(),
            criteria,
            revision.minimum_bar.unwrap_or(self.minimum_bar),
            floor,
        )
    }
}

/// Rubric shape returned by the formatting backend.
#[derive(Debug, Clone, Deserialize)]
pub struct CriteriaDraft {
    #[serde(alias = "format_type")]
    pub format: OutputFormat,
    #[serde(default)]
    pub rationale: String,
    pub criteria: Vec<String>,
    pub minimum_bar: f64,
}

/// Changes a human asks for at the checkpoint.
///
/// Empty / `None` fields leave the corresponding part of the pending rubric
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CriteriaRevision {
    /// Switch the selected idea before re-formatting.
    pub idea: Option<IdeaId>,
    pub format: Option<OutputFormat>,
    pub criteria: Vec<String>,
    pub minimum_bar: Option<f64>,
    /// Free-form guidance forwarded to the formatting backend.
    pub guidance: Option<String>,
}
