//! Loop decision rules.
//!
//! Kept free of I/O so the same rules drive the live loop and replay.

use serde::{Deserialize, Serialize};

use super::LoopState;
use crate::config::Tunables;

/// Bounds for one refinement run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopPolicy {
    pub max_cycles: u32,
    pub plateau_threshold: f64,
    pub plateau_window: u32,
}

impl LoopPolicy {
    pub fn from_tunables(tunables: &Tunables) -> Self {
        Self {
            max_cycles: tunables.max_refinement_cycles,
            plateau_threshold: tunables.plateau_threshold,
            plateau_window: tunables.plateau_window,
        }
    }

    /// Terminal or continuing state after evaluating `cycle`.
    ///
    /// Checked in order: pass, plateau, cycle budget.
    pub fn decide(&self, cycle: u32, passed: bool, non_improving: u32) -> LoopState {
        if passed {
            LoopState::Accepted
        } else if non_improving >= self.plateau_window {
            LoopState::PlateauStopped
        } else if cycle + 1 >= self.max_cycles {
            LoopState::CycleExhausted
        } else {
            LoopState::Continuing
        }
    }
}

/// Running best score and consecutive non-improving count.
///
/// The first observation is the baseline and never counts. After that a
/// cycle is non-improving when it beats neither the best score nor the
/// previous cycle's score by more than the threshold. A rise over the
/// previous score beyond the threshold resets the count even if the best
/// has not moved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceTracker {
    best_score: Option<f64>,
    best_version: Option<u32>,
    previous_score: Option<f64>,
    non_improving: u32,
}

impl ConvergenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in the score of `version` and return the updated count.
    pub fn observe(&mut self, version: u32, score: f64, threshold: f64) -> u32 {
        if let (Some(best), Some(previous)) = (self.best_score, self.previous_score) {
            let improvement = score - best;
            let uptick = score - previous;
            if improvement <= threshold && uptick <= threshold {
                self.non_improving += 1;
            } else {
                self.non_improving = 0;
            }
        }

        if self.best_score.map_or(true, |best| score > best) {
            self.best_score = Some(score);
            self.best_version = Some(version);
        }
        self.previous_score = Some(score);
        self.non_improving
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best_score
    }

    pub fn best_version(&self) -> Option<u32> {
        self.best_version
    }

    pub fn non_improving(&self) -> u32 {
        self.non_improving
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_cycles: u32, window: u32) -> LoopPolicy {
        LoopPolicy {
            max_cycles,
            plateau_threshold: 5.0,
            plateau_window: window,
        }
    }

    #[test]
    fn test_baseline_never_counts() {
        let mut tracker = ConvergenceTracker::new();
        assert_eq!(tracker.observe(1, 40.0, 5.0), 0);
        assert_eq!(tracker.best_version(), Some(1));
    }

    #[test]
    fn test_plateau_counts_consecutive_flat_cycles() {
        let mut tracker = ConvergenceTracker::new();
        tracker.observe(1, 60.0, 5.0);
        assert_eq!(tracker.observe(2, 62.0, 5.0), 1);
        assert_eq!(tracker.observe(3, 61.0, 5.0), 2);
        assert_eq!(tracker.best_score(), Some(62.0));
        assert_eq!(tracker.best_version(), Some(2));
    }

    #[test]
    fn test_uptick_resets_without_new_best() {
        let mut tracker = ConvergenceTracker::new();
        tracker.observe(1, 60.0, 5.0);
        assert_eq!(tracker.observe(2, 50.0, 5.0), 1);
        assert_eq!(tracker.observe(3, 58.0, 5.0), 0);
        assert_eq!(tracker.best_version(), Some(1));
        assert_eq!(tracker.observe(4, 57.0, 5.0), 1);
    }

    #[test]
    fn test_large_improvement_resets() {
        let mut tracker = ConvergenceTracker::new();
        tracker.observe(1, 40.0, 5.0);
        assert_eq!(tracker.observe(2, 41.0, 5.0), 1);
        assert_eq!(tracker.observe(3, 70.0, 5.0), 0);
        assert_eq!(tracker.best_version(), Some(3));
    }

    #[test]
    fn test_ties_keep_earlier_version() {
        let mut tracker = ConvergenceTracker::new();
        tracker.observe(1, 70.0, 0.0);
        tracker.observe(2, 70.0, 0.0);
        assert_eq!(tracker.best_version(), Some(1));
    }

    #[test]
    fn test_decide_order() {
        let p = policy(3, 2);
        assert_eq!(p.decide(2, true, 5), LoopState::Accepted);
        assert_eq!(p.decide(2, false, 2), LoopState::PlateauStopped);
        assert_eq!(p.decide(2, false, 1), LoopState::CycleExhausted);
        assert_eq!(p.decide(0, false, 0), LoopState::Continuing);
        assert_eq!(p.decide(1, false, 1), LoopState::Continuing);
    }

    #[test]
    fn test_single_cycle_budget_exhausts_immediately() {
        assert_eq!(policy(1, 2).decide(0, false, 0), LoopState::CycleExhausted);
    }
}
