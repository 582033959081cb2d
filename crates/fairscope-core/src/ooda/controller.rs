//! OODA cycle controller.
//!
//! Runs Observe → Orient → Decide → Act in strict sequence over one batch of
//! records. Every stage is callable on its own and is idempotent for identical
//! input. The controller keeps no state between cycles; audit history belongs
//! to an [`AuditLog`](crate::audit::AuditLog) owned by the caller.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregator::{aggregate, attribute_set, Aggregation};
use crate::config::PipelineConfig;
use crate::domain::record::{
    GROUND_TRUTH_COLUMN, PREDICTED_COLUMN, TEXT_COLUMN, TIMESTAMP_COLUMN,
};
use crate::domain::{
    ActionRecord, ColumnType, Decision, EvaluationRecord, FairnessError, FairnessReport,
    Observation, Result,
};
use crate::fairness::compute_fairness;
use crate::metrics::METRICS;
use crate::obs;

use super::hook::MitigationHook;
use super::policy::SeverityPolicy;

/// Stage of an OODA cycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Observe,
    Orient,
    Decide,
    Act,
    Complete,
}

impl CyclePhase {
    /// The phase that follows this one; `Complete` is terminal.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Observe => Some(Self::Orient),
            Self::Orient => Some(Self::Decide),
            Self::Decide => Some(Self::Act),
            Self::Act => Some(Self::Complete),
            Self::Complete => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Observe => "observe",
            Self::Orient => "orient",
            Self::Decide => "decide",
            Self::Act => "act",
            Self::Complete => "complete",
        }
    }
}

/// Output of the Orient stage: the report plus the group stats it was derived from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Orientation {
    pub report: FairnessReport,
    pub aggregation: Aggregation,
}

/// Everything one full cycle produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleOutcome {
    pub cycle_id: Uuid,
    pub observation: Observation,
    pub orientation: Orientation,
    pub decision: Decision,
    pub action: ActionRecord,
    /// Phases in the order they completed; always ends with `Complete`.
    pub phases: Vec<CyclePhase>,
}

/// Stateless OODA controller configured with attributes, threshold, and severity bands.
#[derive(Debug, Clone)]
pub struct OodaController {
    attributes: BTreeSet<String>,
    threshold: f64,
    policy: SeverityPolicy,
}

impl OodaController {
    /// Build a controller from a validated [`PipelineConfig`].
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            attributes: attribute_set(&config.attributes)?,
            threshold: config.threshold,
            policy: config.severity_policy()?,
        })
    }

    pub fn attributes(&self) -> &BTreeSet<String> {
        &self.attributes
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn policy(&self) -> &SeverityPolicy {
        &self.policy
    }

    /// Observe: capture batch metadata. Does not aggregate.
    pub fn observe(&self, records: &[EvaluationRecord]) -> Observation {
        let mut schema_snapshot = BTreeMap::from([
            (TEXT_COLUMN.to_string(), ColumnType::Text),
            (PREDICTED_COLUMN.to_string(), ColumnType::Label),
            (GROUND_TRUTH_COLUMN.to_string(), ColumnType::Label),
            (TIMESTAMP_COLUMN.to_string(), ColumnType::Timestamp),
        ]);

        let mut present: BTreeMap<String, usize> = BTreeMap::new();
        for record in records {
            for name in record.demographic_attributes.keys() {
                *present.entry(name.clone()).or_insert(0) += 1;
            }
        }
        // Requested attributes are reported even when no record carries them.
        for name in &self.attributes {
            present.entry(name.clone()).or_insert(0);
        }

        let missing_attribute_counts = present
            .iter()
            .map(|(name, seen)| (name.clone(), records.len() - seen))
            .collect();
        for name in present.keys() {
            schema_snapshot
                .entry(name.clone())
                .or_insert(ColumnType::Category);
        }

        Observation {
            record_count: records.len(),
            column_names: schema_snapshot.keys().cloned().collect(),
            collected_at: Utc::now(),
            schema_snapshot,
            missing_attribute_counts,
        }
    }

    /// Orient: aggregate by demographic group and score fairness.
    pub fn orient(&self, records: &[EvaluationRecord]) -> Result<Orientation> {
        let attributes: Vec<&str> = self.attributes.iter().map(String::as_str).collect();
        let aggregation = aggregate(records, &attributes)?;
        let report = compute_fairness(&aggregation.groups, self.threshold)?;
        Ok(Orientation {
            report,
            aggregation,
        })
    }

    /// Decide: map the report onto a severity band and its playbook.
    pub fn decide(&self, report: &FairnessReport) -> Decision {
        let severity = self.policy.classify(report.unfairness());
        let trigger = self.policy.trigger_level();
        let triggering_gaps = report
            .per_attribute_gaps
            .iter()
            .filter(|(_, gap)| **gap >= trigger)
            .map(|(name, _)| name.clone())
            .collect();

        Decision {
            severity,
            recommended_actions: severity.recommended_actions(),
            triggering_gaps,
        }
    }

    /// Act: record the decision and optionally run the mitigation hook.
    ///
    /// Never fails. A hook error is captured in `notes` with `applied = false`.
    pub fn act(&self, decision: &Decision, hook: Option<&dyn MitigationHook>) -> ActionRecord {
        let (applied, notes) = if !decision.severity.requires_mitigation() {
            (false, "no mitigation required (severity none)".to_string())
        } else {
            match hook {
                None => (
                    false,
                    format!(
                        "no mitigation hook configured; {} recommended actions recorded",
                        decision.recommended_actions.len()
                    ),
                ),
                Some(hook) => match hook.apply_mitigation(decision) {
                    Ok(true) => (
                        true,
                        format!(
                            "mitigation applied: {}",
                            decision.recommended_actions.join(", ")
                        ),
                    ),
                    Ok(false) => (false, "mitigation hook declined to act".to_string()),
                    Err(e) => {
                        obs::emit_mitigation_failed(decision.severity, &e);
                        METRICS.inc_mitigation_failures();
                        (false, format!("mitigation failed: {e:#}"))
                    }
                },
            }
        };

        ActionRecord {
            decision_ref: decision.clone(),
            executed_at: Utc::now(),
            applied,
            notes,
        }
    }

    /// Run all four stages in order.
    ///
    /// Errors from Orient (aggregation or fairness configuration) propagate;
    /// Act never fails.
    pub fn run_cycle(
        &self,
        records: &[EvaluationRecord],
        hook: Option<&dyn MitigationHook>,
    ) -> Result<CycleOutcome> {
        let cycle_id = Uuid::new_v4();
        let _span = obs::CycleSpan::enter(&cycle_id);
        let start = Instant::now();
        let mut phases = Vec::with_capacity(5);
        let mut phase = CyclePhase::Observe;

        obs::emit_cycle_started(&cycle_id, records.len());

        let observation = self.observe(records);
        phase = self.advance(&cycle_id, phase, &mut phases)?;

        let orientation = self.orient(records)?;
        phase = self.advance(&cycle_id, phase, &mut phases)?;

        let decision = self.decide(&orientation.report);
        obs::emit_decision(
            &cycle_id,
            decision.severity,
            orientation.report.overall_fairness,
            orientation.report.passed,
        );
        phase = self.advance(&cycle_id, phase, &mut phases)?;

        let action = self.act(&decision, hook);
        phase = self.advance(&cycle_id, phase, &mut phases)?;
        phases.push(phase);

        METRICS.inc_cycles_completed();
        obs::emit_cycle_finished(
            &cycle_id,
            start.elapsed().as_millis() as u64,
            action.applied,
        );

        Ok(CycleOutcome {
            cycle_id,
            observation,
            orientation,
            decision,
            action,
            phases,
        })
    }

    fn advance(
        &self,
        cycle_id: &Uuid,
        current: CyclePhase,
        completed: &mut Vec<CyclePhase>,
    ) -> Result<CyclePhase> {
        obs::emit_stage_completed(cycle_id, current.name());
        completed.push(current);
        current.next().ok_or_else(|| {
            FairnessError::config(format!("cycle {cycle_id} advanced past completion"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Label, Severity};

    fn controller(threshold: f64) -> OodaController {
        OodaController::new(&PipelineConfig::for_attributes(&["gender"]).with_threshold(threshold))
            .unwrap()
    }

    fn batch() -> Vec<EvaluationRecord> {
        let mut records = Vec::new();
        for i in 0..5 {
            let pred = if i < 4 { Label::Positive } else { Label::Negative };
            records.push(
                EvaluationRecord::new("m", pred, Label::Positive).with_attribute("gender", "male"),
            );
        }
        for i in 0..5 {
            let pred = if i < 2 { Label::Positive } else { Label::Negative };
            records.push(
                EvaluationRecord::new("f", pred, Label::Positive)
                    .with_attribute("gender", "female"),
            );
        }
        records
    }

    #[test]
    fn test_phase_sequence() {
        let mut phase = CyclePhase::Observe;
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            seen.push(next);
            phase = next;
        }
        assert_eq!(
            seen,
            vec![
                CyclePhase::Observe,
                CyclePhase::Orient,
                CyclePhase::Decide,
                CyclePhase::Act,
                CyclePhase::Complete
            ]
        );
    }

    #[test]
    fn test_observe_reports_schema_and_missing() {
        let mut records = batch();
        records.push(EvaluationRecord::new("x", Label::Neutral, Label::Neutral));
        let obs = controller(0.8).observe(&records);
        assert_eq!(obs.record_count, 11);
        assert!(obs.column_names.contains("gender"));
        assert!(obs.column_names.contains("input_text"));
        assert_eq!(obs.schema_snapshot["gender"], ColumnType::Category);
        assert_eq!(obs.missing_attribute_counts["gender"], 1);
    }

    #[test]
    fn test_decide_triggering_gaps() {
        let ctl = controller(0.9);
        let orientation = ctl.orient(&batch()).unwrap();
        let decision = ctl.decide(&orientation.report);
        assert!(decision.triggering_gaps.contains("gender"));
        assert!(matches!(decision.severity, Severity::Medium | Severity::High));
    }

    #[test]
    fn test_act_without_hook_is_not_applied() {
        let ctl = controller(0.9);
        let decision = Decision {
            severity: Severity::High,
            recommended_actions: Severity::High.recommended_actions(),
            triggering_gaps: BTreeSet::new(),
        };
        let action = ctl.act(&decision, None);
        assert!(!action.applied);
        assert!(action.notes.contains("no mitigation hook"));
    }

    #[test]
    fn test_act_captures_hook_failure() {
        let ctl = controller(0.9);
        let decision = Decision {
            severity: Severity::Critical,
            recommended_actions: Severity::Critical.recommended_actions(),
            triggering_gaps: BTreeSet::new(),
        };
        let failing = |_: &Decision| -> anyhow::Result<bool> {
            anyhow::bail!("augmentation service unavailable")
        };
        let action = ctl.act(&decision, Some(&failing));
        assert!(!action.applied);
        assert!(action.notes.contains("augmentation service unavailable"));
    }

    #[test]
    fn test_act_skips_hook_when_no_mitigation_needed() {
        let ctl = controller(0.5);
        let decision = Decision {
            severity: Severity::None,
            recommended_actions: Severity::None.recommended_actions(),
            triggering_gaps: BTreeSet::new(),
        };
        let hook = |_: &Decision| -> anyhow::Result<bool> { panic!("must not be called") };
        let action = ctl.act(&decision, Some(&hook));
        assert!(!action.applied);
    }

    #[test]
    fn test_run_cycle_records_all_phases() {
        let outcome = controller(0.9).run_cycle(&batch(), None).unwrap();
        assert_eq!(outcome.phases.len(), 5);
        assert_eq!(outcome.phases.last(), Some(&CyclePhase::Complete));
        assert_eq!(outcome.action.decision_ref, outcome.decision);
    }

    #[test]
    fn test_new_rejects_empty_attributes() {
        let err = OodaController::new(&PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, FairnessError::Configuration(_)));
    }
}
