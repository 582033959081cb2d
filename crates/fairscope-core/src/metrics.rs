//! Global atomic counters for fairscope.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a CLI command finishes).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    cycles_completed: AtomicU64,
    records_skipped: AtomicU64,
    mitigation_failures: AtomicU64,
    ab_tests_run: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            cycles_completed: AtomicU64::new(0),
            records_skipped: AtomicU64::new(0),
            mitigation_failures: AtomicU64::new(0),
            ab_tests_run: AtomicU64::new(0),
        }
    }

    pub fn inc_cycles_completed(&self) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cycles_completed", "counter incremented");
    }

    /// Add `n` records excluded by aggregation.
    pub fn add_records_skipped(&self, n: u64) {
        self.records_skipped.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "records_skipped", n = n, "counter incremented");
    }

    pub fn inc_mitigation_failures(&self) {
        self.mitigation_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "mitigation_failures", "counter incremented");
    }

    pub fn inc_ab_tests(&self) {
        self.ab_tests_run.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "ab_tests_run", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            cycles_completed = self.cycles_completed(),
            records_skipped = self.records_skipped(),
            mitigation_failures = self.mitigation_failures(),
            ab_tests_run = self.ab_tests_run(),
        );
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    pub fn records_skipped(&self) -> u64 {
        self.records_skipped.load(Ordering::Relaxed)
    }

    pub fn mitigation_failures(&self) -> u64 {
        self.mitigation_failures.load(Ordering::Relaxed)
    }

    pub fn ab_tests_run(&self) -> u64 {
        self.ab_tests_run.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.cycles_completed.store(0, Ordering::Relaxed);
        self.records_skipped.store(0, Ordering::Relaxed);
        self.mitigation_failures.store(0, Ordering::Relaxed);
        self.ab_tests_run.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_cycles_completed();
        m.inc_cycles_completed();
        assert_eq!(m.cycles_completed(), 2);

        m.add_records_skipped(7);
        m.add_records_skipped(3);
        assert_eq!(m.records_skipped(), 10);

        m.inc_mitigation_failures();
        m.inc_ab_tests();
        assert_eq!(m.mitigation_failures(), 1);
        assert_eq!(m.ab_tests_run(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_cycles_completed();
        m.add_records_skipped(4);
        m.inc_mitigation_failures();
        m.inc_ab_tests();
        m.reset();
        assert_eq!(m.cycles_completed(), 0);
        assert_eq!(m.records_skipped(), 0);
        assert_eq!(m.mitigation_failures(), 0);
        assert_eq!(m.ab_tests_run(), 0);
    }
}
