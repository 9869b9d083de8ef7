//! Per-backend score records and their aggregate.

use serde::{Deserialize, Serialize};

use super::error::BackendFailure;
use crate::domain::IdeaId;
use crate::gateway::BackendId;

/// One backend's score for one idea.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub idea_id: IdeaId,
    pub backend: BackendId,
    pub score: f64,
    pub rationale: String,
}

/// Score shape returned by a scoring backend.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoreOutput {
    pub score: f64,
    #[serde(default)]
    pub rationale: String,
}

/// Aggregate of all scoring backends for one idea.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub idea_id: IdeaId,
    pub mean_score: f64,
    /// `max - min` over successful scores; zero with fewer than two.
    pub divergence: f64,
    /// Backends disagree by more than the configured threshold.
    pub flagged: bool,
    pub records: Vec<ScoreRecord>,
    pub failures: Vec<BackendFailure>,
}

impl ScoreSummary {
    /// Aggregate successful records.
    ///
    /// With no successful record the failures are handed back as the error.
    ///
    /// Divergence needs at least two observations; a lone score is never
    /// flagged regardless of the threshold.
    pub fn aggregate(
        idea_id: IdeaId,
        records: Vec<ScoreRecord>,
        failures: Vec<BackendFailure>,
        divergence_threshold: f64,
    ) -> Result<Self, Vec<BackendFailure>> {
        if records.is_empty() {
            return Err(failures);
        }

        let n = records.len() as f64;
        let mean_score = records.iter().map(|r| r.score).sum::<f64>() / n;

        let divergence = if records.len() >= 2 {
            let max = records.iter().map(|r| r.score).fold(f64::MIN, f64::max);
            let min = records.iter().map(|r| r.score).fold(f64::MAX, f64::min);
            max - min
        } else {
            0.0
        };
        let flagged = records.len() >= 2 && divergence > divergence_threshold;

        Ok(Self {
            idea_id,
            mean_score,
            divergence,
            flagged,
            records,
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(backend: &str, score: f64) -> ScoreRecord {
        ScoreRecord {
            idea_id: IdeaId::from_index(0),
            backend: BackendId::new(backend),
            score,
            rationale: String::new(),
        }
    }

    #[test]
    fn test_two_backends_flag_wide_spread() {
        let summary = ScoreSummary::aggregate(
            IdeaId::from_index(0),
            vec![record("gpt", 40.0), record("deepseek", 90.0)],
            vec![],
            30.0,
        )
        .unwrap();
        assert_eq!(summary.mean_score, 65.0);
        assert_eq!(summary.divergence, 50.0);
        assert!(summary.flagged);
    }

    #[test]
    fn test_divergence_at_threshold_is_not_flagged() {
        let summary = ScoreSummary::aggregate(
            IdeaId::from_index(0),
            vec![record("a", 50.0), record("b", 80.0)],
            vec![],
            30.0,
        )
        .unwrap();
        assert_eq!(summary.divergence, 30.0);
        assert!(!summary.flagged);
    }

    #[test]
    fn test_single_success_never_flags() {
        let summary = ScoreSummary::aggregate(
            IdeaId::from_index(0),
            vec![record("gpt", 72.0)],
            vec![],
            0.0,
        )
        .unwrap();
        assert_eq!(summary.mean_score, 72.0);
        assert_eq!(summary.divergence, 0.0);
        assert!(!summary.flagged);
    }

    #[test]
    fn test_divergence_is_order_independent() {
        let forward = ScoreSummary::aggregate(
            IdeaId::from_index(0),
            vec![record("a", 12.5), record("b", 77.0), record("c", 40.0)],
            vec![],
            10.0,
        )
        .unwrap();
        let reversed = ScoreSummary::aggregate(
            IdeaId::from_index(0),
            vec![record("c", 40.0), record("b", 77.0), record("a", 12.5)],
            vec![],
            10.0,
        )
        .unwrap();
        assert_eq!(forward.divergence, reversed.divergence);
        assert_eq!(forward.divergence, 64.5);
        assert!(forward.divergence >= 0.0);
    }

    #[test]
    fn test_no_records_returns_failures() {
        let failure = BackendFailure {
            backend: BackendId::new("gpt"),
            error: crate::gateway::InvocationError::RateLimited {
                detail: "429".into(),
            },
        };
        let err = ScoreSummary::aggregate(IdeaId::from_index(0), vec![], vec![failure.clone()], 1.0)
            .unwrap_err();
        assert_eq!(err, vec![failure]);
    }
}
