//! Structured observability hooks for fairness cycle events.
//!
//! This module provides:
//! - Cycle-scoped tracing spans via `CycleSpan` RAII guard
//! - Emission functions for cycle start, stage completion, decision, finish,
//!   mitigation failure, and A/B comparisons
//!
//! Events are emitted at `info!` level with an `event` field naming the
//! lifecycle point. Filter with `RUST_LOG`.

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::Severity;

/// RAII guard that enters a cycle-scoped tracing span for the duration of a cycle.
///
/// ```ignore
/// let _span = CycleSpan::enter(&cycle_id);
/// // every event below carries cycle_id
/// ```
pub struct CycleSpan {
    _span: tracing::span::EnteredSpan,
}

impl CycleSpan {
    pub fn enter(cycle_id: &Uuid) -> Self {
        let span = tracing::info_span!("fairscope.cycle", cycle_id = %cycle_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: cycle started over `record_count` records.
pub fn emit_cycle_started(cycle_id: &Uuid, record_count: usize) {
    info!(event = "cycle.started", cycle_id = %cycle_id, record_count = record_count);
}

pub fn emit_stage_completed(cycle_id: &Uuid, stage: &str) {
    info!(event = "cycle.stage_completed", cycle_id = %cycle_id, stage = %stage);
}

/// Emit event: Decide stage classified the report.
pub fn emit_decision(cycle_id: &Uuid, severity: Severity, overall_fairness: f64, passed: bool) {
    info!(
        event = "cycle.decided",
        cycle_id = %cycle_id,
        severity = %severity,
        overall_fairness = overall_fairness,
        passed = passed,
    );
}

/// Emit event: cycle finished with duration and mitigation outcome.
pub fn emit_cycle_finished(cycle_id: &Uuid, duration_ms: u64, mitigation_applied: bool) {
    info!(
        event = "cycle.finished",
        cycle_id = %cycle_id,
        duration_ms = duration_ms,
        mitigation_applied = mitigation_applied,
    );
}

/// Emit event: the mitigation hook returned an error (warning level).
pub fn emit_mitigation_failed(severity: Severity, error: &anyhow::Error) {
    warn!(event = "mitigation.failed", severity = %severity, error = %format!("{error:#}"));
}

/// Emit event: an A/B comparison completed.
pub fn emit_ab_compared(method: &str, p_value: f64, significant: bool) {
    info!(
        event = "ab.compared",
        method = %method,
        p_value = p_value,
        significant = significant,
    );
}
