//! Bounded draft/evaluate refinement loop.
//!
//! ```text
//! Drafting -> Evaluating -> Accepted
//!                        -> PlateauStopped
//!                        -> CycleExhausted
//!                        -> Continuing -> Drafting (cycle + 1)
//! Drafting -> DraftFailed
//! ```

use serde::{Deserialize, Serialize};

pub mod error;
pub mod policy;
pub mod runner;
pub mod state;

pub use error::{RefinementError, RefinementResult};
pub use policy::{ConvergenceTracker, LoopPolicy};
pub use runner::{RefinementLoop, RefinementOutcome};
pub use state::RefinementState;

/// States of the refinement loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Drafting,
    Evaluating,
    Accepted,
    Continuing,
    PlateauStopped,
    CycleExhausted,
    DraftFailed,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::PlateauStopped | Self::CycleExhausted | Self::DraftFailed
        )
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Drafting => "drafting",
            Self::Evaluating => "evaluating",
            Self::Accepted => "accepted",
            Self::Continuing => "continuing",
            Self::PlateauStopped => "plateau_stopped",
            Self::CycleExhausted => "cycle_exhausted",
            Self::DraftFailed => "draft_failed",
        };
        f.write_str(s)
    }
}

/// The three states a completed loop can stop in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopExit {
    Accepted,
    PlateauStopped,
    CycleExhausted,
}

impl LoopExit {
    /// `None` for states the loop keeps running or fails from.
    pub fn from_state(state: LoopState) -> Option<Self> {
        match state {
            LoopState::Accepted => Some(Self::Accepted),
            LoopState::PlateauStopped => Some(Self::PlateauStopped),
            LoopState::CycleExhausted => Some(Self::CycleExhausted),
            _ => None,
        }
    }
}

impl From<LoopExit> for LoopState {
    fn from(exit: LoopExit) -> Self {
        match exit {
            LoopExit::Accepted => LoopState::Accepted,
            LoopExit::PlateauStopped => LoopState::PlateauStopped,
            LoopExit::CycleExhausted => LoopState::CycleExhausted,
        }
    }
}

impl std::fmt::Display for LoopExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        LoopState::from(*self).fmt(f)
    }
}
