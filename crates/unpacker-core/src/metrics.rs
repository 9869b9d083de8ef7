//! Global atomic counters for pipeline observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters — no allocations, no locking.
pub struct Metrics {
    invocations: AtomicU64,
    invocation_failures: AtomicU64,
    refinement_cycles: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            invocations: AtomicU64::new(0),
            invocation_failures: AtomicU64::new(0),
            refinement_cycles: AtomicU64::new(0),
        }
    }

    /// Count one backend invocation, successful or not.
    pub fn inc_invocations(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "invocations", "counter incremented");
    }

    /// Count one failed backend invocation.
    pub fn inc_invocation_failures(&self) {
        self.invocation_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "invocation_failures", "counter incremented");
    }

    /// Count one completed draft/evaluate cycle.
    pub fn inc_refinement_cycles(&self) {
        self.refinement_cycles.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "refinement_cycles", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            invocations = self.invocations(),
            invocation_failures = self.invocation_failures(),
            refinement_cycles = self.refinement_cycles(),
        );
    }

    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    pub fn invocation_failures(&self) -> u64 {
        self.invocation_failures.load(Ordering::Relaxed)
    }

    pub fn refinement_cycles(&self) -> u64 {
        self.refinement_cycles.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.invocations.store(0, Ordering::Relaxed);
        self.invocation_failures.store(0, Ordering::Relaxed);
        self.refinement_cycles.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_invocations();
        m.inc_invocations();
        m.inc_invocation_failures();
        m.inc_refinement_cycles();
        assert_eq!(m.invocations(), 2);
        assert_eq!(m.invocation_failures(), 1);
        assert_eq!(m.refinement_cycles(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_invocations();
        m.inc_invocation_failures();
        m.inc_refinement_cycles();
        m.reset();
        assert_eq!(m.invocations(), 0);
        assert_eq!(m.invocation_failures(), 0);
        assert_eq!(m.refinement_cycles(), 0);
    }
}
