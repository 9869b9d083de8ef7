//! Run configuration: the recognised tunables and the backend roster.
//!
//! A [`PipelineConfig`] is loaded once through a [`ConfigProvider`],
//! validated, and then threaded read-only into every component.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::{SCORE_MAX, SCORE_MIN};
use crate::gateway::BackendId;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("at least one scoring backend must be configured")]
    NoScoringBackends,

    #[error("scoring backend {0} is listed more than once")]
    DuplicateScoringBackend(BackendId),

    #[error("failed to load configuration: {0}")]
    Load(String),
}

/// Which backend serves each pipeline role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendRoster {
    pub generator: BackendId,
    /// Scored concurrently for every idea.
    pub scorers: Vec<BackendId>,
    pub formatter: BackendId,
    pub drafter: BackendId,
    pub evaluator: BackendId,
    /// Optional backend asked for a prose diagnosis on non-convergence.
    pub analyst: Option<BackendId>,
}

impl Default for BackendRoster {
    fn default() -> Self {
        Self {
            generator: BackendId::new("claude"),
            scorers: vec![BackendId::new("gpt"), BackendId::new("deepseek")],
            formatter: BackendId::new("deepseek"),
            drafter: BackendId::new("claude"),
            evaluator: BackendId::new("deepseek"),
            analyst: Some(BackendId::new("deepseek")),
        }
    }
}

/// Tunables that govern loop and scoring decisions.
///
/// Recorded at the head of every provenance log so a replay applies the
/// same rules the run did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tunables {
    pub max_refinement_cycles: u32,
    pub plateau_threshold: f64,
    pub plateau_window: u32,
    pub score_divergence_threshold: f64,
    pub word_limit: usize,
    pub minimum_bar_floor: f64,
}

/// Full configuration for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_refinement_cycles: u32,
    /// Absolute score delta (0–100 scale) at or below which a cycle does not count as improving.
    pub plateau_threshold: f64,
    /// Consecutive non-improving cycles that stop the loop.
    pub plateau_window: u32,
    pub score_divergence_threshold: f64,
    pub word_limit: usize,
    /// Extra drafting attempts after a failed or over-limit draft.
    pub draft_retry_limit: u32,
    pub minimum_bar_floor: f64,
    pub max_checkpoint_rounds: u32,
    pub backends: BackendRoster,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_refinement_cycles: 3,
            plateau_threshold: 5.0,
            plateau_window: 2,
            score_divergence_threshold: 20.0,
            word_limit: 150,
            draft_retry_limit: 2,
            minimum_bar_floor: 80.0,
            max_checkpoint_rounds: 3,
            backends: BackendRoster::default(),
        }
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field,
            reason: format!("{value} must be a finite number >= 0"),
        })
    }
}

fn at_least_one(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value >= 1 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field,
            reason: "must be >= 1".to_string(),
        })
    }
}

impl PipelineConfig {
    /// Check every tunable against its documented range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        at_least_one("max_refinement_cycles", self.max_refinement_cycles.into())?;
        at_least_one("plateau_window", self.plateau_window.into())?;
        at_least_one("word_limit", self.word_limit as u64)?;
        at_least_one("max_checkpoint_rounds", self.max_checkpoint_rounds.into())?;
        non_negative("plateau_threshold", self.plateau_threshold)?;
        non_negative("score_divergence_threshold", self.score_divergence_threshold)?;
        if !(SCORE_MIN..=SCORE_MAX).contains(&self.minimum_bar_floor) {
            return Err(ConfigError::InvalidValue {
                field: "minimum_bar_floor",
                reason: format!("{} is outside [{SCORE_MIN}, {SCORE_MAX}]", self.minimum_bar_floor),
            });
        }

        if self.backends.scorers.is_empty() {
            return Err(ConfigError::NoScoringBackends);
        }
        let mut seen = BTreeSet::new();
        for backend in &self.backends.scorers {
            if !seen.insert(backend) {
                return Err(ConfigError::DuplicateScoringBackend(backend.clone()));
            }
        }
        Ok(())
    }

    pub fn tunables(&self) -> Tunables {
        Tunables {
            max_refinement_cycles: self.max_refinement_cycles,
            plateau_threshold: self.plateau_threshold,
            plateau_window: self.plateau_window,
            score_divergence_threshold: self.score_divergence_threshold,
            word_limit: self.word_limit,
            minimum_bar_floor: self.minimum_bar_floor,
        }
    }
}

/// Supplies the run configuration at process start.
pub trait ConfigProvider {
    fn load(&self) -> Result<PipelineConfig, ConfigError>;
}

/// Provider over an in-memory configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticConfig(pub PipelineConfig);

impl ConfigProvider for StaticConfig {
    fn load(&self) -> Result<PipelineConfig, ConfigError> {
        self.0.validate()?;
        Ok(self.0.clone())
    }
}
