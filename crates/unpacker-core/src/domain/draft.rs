//! Versioned drafts and the evaluations scored against them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::gateway::BackendId;

/// Maximum critique items carried into the next drafting cycle.
pub const MAX_CRITIQUE_ITEMS: usize = 3;

/// Count whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// One version of the artifact.
///
/// Versions are 1-based and index into the loop's append-only history;
/// `parent_version` refers back into that same history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub version: u32,
    pub cycle_index: u32,
    pub text: String,
    pub explainer: String,
    pub word_count: usize,
    pub producing_backend: BackendId,
    pub parent_version: Option<u32>,
}

/// Draft shape returned by the drafting backend.
#[derive(Debug, Clone, Deserialize)]
pub struct DraftOutput {
    #[serde(alias = "content")]
    pub text: String,
    #[serde(default)]
    pub explainer: String,
}

/// The evaluator's verdict on one draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub cycle_index: u32,
    pub draft_version: u32,
    pub score: f64,
    pub passed: bool,
    pub critique: Vec<String>,
    pub criterion_scores: BTreeMap<String, f64>,
    pub producing_backend: BackendId,
}

/// Evaluation shape returned by the evaluating backend.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationOutput {
    #[serde(alias = "total_score")]
    pub score: f64,
    #[serde(default, alias = "pass_flag")]
    pub pass: Option<bool>,
    #[serde(default, alias = "feedback")]
    pub critique: Vec<String>,
    #[serde(default, alias = "scores")]
    pub criterion_scores: BTreeMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count_splits_on_any_whitespace() {
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("  one\ttwo\nthree  "), 3);
    }

    #[test]
    fn test_evaluation_output_aliases() {
        let out: EvaluationOutput = serde_json::from_value(serde_json::json!({
            "total_score": 61.5,
            "feedback": ["cut the second stanza"],
            "scores": { "surprise_density": 55 }
        }))
        .unwrap();
        assert_eq!(out.score, 61.5);
        assert_eq!(out.pass, None);
        assert_eq!(out.critique.len(), 1);
        assert_eq!(out.criterion_scores["surprise_density"], 55.0);
    }
}
