//! Fold a provenance log back into the run's outcome.
//!
//! Replay re-applies the loop decision rules to the recorded evaluations
//! using the tunables recorded at run start, and checks the result against
//! what the run itself recorded. Pure: the same log always replays to the
//! same summary.

use serde::{Deserialize, Serialize};

use crate::checkpoint::Decision;
use crate::domain::digest::digest_of;
use crate::provenance::{ProvenanceEntry, ProvenanceEvent};
use crate::refinement::{ConvergenceTracker, LoopExit, LoopPolicy, LoopState};
use crate::sequencer::RunStatus;

/// Errors from replaying a log.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReplayError {
    #[error("provenance log is empty")]
    EmptyLog,

    #[error("sequence gap: expected seq {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },

    #[error("log does not start with run_started")]
    MissingRunStarted,

    #[error("log has no run_finished entry")]
    MissingRunFinished,

    #[error("replay diverged at seq {seq}: recorded {recorded}, replayed {replayed}")]
    Diverged {
        seq: u64,
        recorded: String,
        replayed: String,
    },
}

/// Outcome reconstructed from a log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub run_id: String,
    pub status: RunStatus,
    pub best_draft_version: Option<u32>,
    pub cycles: u32,
    pub score_trajectory: Vec<f64>,
    pub entries: usize,
    /// Digest over the replayed log, stable across replays.
    pub log_digest: String,
}

/// Replay `entries` and verify them against the recorded outcome.
pub fn replay(entries: &[ProvenanceEntry]) -> Result<ReplaySummary, ReplayError> {
    let first = entries.first().ok_or(ReplayError::EmptyLog)?;
    for (expected, entry) in entries.iter().enumerate() {
        if entry.seq != expected as u64 {
            return Err(ReplayError::SequenceGap {
                expected: expected as u64,
                found: entry.seq,
            });
        }
    }

    let (run_id, tunables) = match &first.event {
        ProvenanceEvent::RunStarted {
            run_id, tunables, ..
        } => (run_id.clone(), *tunables),
        _ => return Err(ReplayError::MissingRunStarted),
    };
    let policy = LoopPolicy::from_tunables(&tunables);

    let mut convergence = ConvergenceTracker::new();
    let mut aborted = false;
    let mut trajectory = Vec::new();
    let mut decided: Option<(LoopState, u32)> = None;
    let mut finished: Option<(u64, RunStatus, Option<u32>)> = None;

    for entry in &entries[1..] {
        match &entry.event {
            ProvenanceEvent::CheckpointDecided {
                decision: Decision::Abort,
                ..
            } => aborted = true,
            ProvenanceEvent::Evaluated {
                draft_version,
                score,
                passed,
            } => {
                if let Some((state, _)) = decided {
                    if state != LoopState::Continuing {
                        return Err(ReplayError::Diverged {
                            seq: entry.seq,
                            recorded: "evaluation".to_string(),
                            replayed: format!("loop already {state}"),
                        });
                    }
                }
                let cycle = trajectory.len() as u32;
                trajectory.push(*score);
                let non_improving =
                    convergence.observe(*draft_version, *score, policy.plateau_threshold);
                decided = Some((policy.decide(cycle, *passed, non_improving), *draft_version));
            }
            ProvenanceEvent::LoopTransition {
                from: LoopState::Evaluating,
                to,
            } => {
                let replayed = decided.map(|(state, _)| state);
                if replayed != Some(*to) {
                    return Err(ReplayError::Diverged {
                        seq: entry.seq,
                        recorded: to.to_string(),
                        replayed: replayed.map_or_else(|| "none".to_string(), |s| s.to_string()),
                    });
                }
            }
            ProvenanceEvent::RunFinished {
                status,
                best_draft_version,
            } => finished = Some((entry.seq, *status, *best_draft_version)),
            _ => {}
        }
    }

    let (finished_seq, recorded_status, recorded_best) =
        finished.ok_or(ReplayError::MissingRunFinished)?;

    let (status, best_draft_version) = if aborted {
        (Some(RunStatus::UserAborted), None)
    } else {
        match decided {
            Some((LoopState::Accepted, version)) => (Some(RunStatus::Accepted), Some(version)),
            Some((state, _)) => (
                LoopExit::from_state(state).map(RunStatus::from),
                convergence.best_version(),
            ),
            None => (None, None),
        }
    };

    if status != Some(recorded_status) {
        return Err(ReplayError::Diverged {
            seq: finished_seq,
            recorded: recorded_status.to_string(),
            replayed: status.map_or_else(|| "none".to_string(), |s| s.to_string()),
        });
    }
    if best_draft_version != recorded_best {
        return Err(ReplayError::Diverged {
            seq: finished_seq,
            recorded: format!("best draft {recorded_best:?}"),
            replayed: format!("best draft {best_draft_version:?}"),
        });
    }

    let log_digest = digest_of(&entries).map_err(|e| ReplayError::Diverged {
        seq: finished_seq,
        recorded: "serializable log".to_string(),
        replayed: e.to_string(),
    })?;

    Ok(ReplaySummary {
        run_id,
        status: recorded_status,
        best_draft_version,
        cycles: trajectory.len() as u32,
        score_trajectory: trajectory,
        entries: entries.len(),
        log_digest,
    })
}
