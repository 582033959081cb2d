//! Output records of the fairness pipeline: reports, decisions, and actions.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Population-weighted fairness summary over a set of group statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FairnessReport {
    /// `1 - weighted mean rate gap`, in 0.0–1.0.
    pub overall_fairness: f64,

    /// Attribute → `max(positive_rate) - min(positive_rate)`.
    pub per_attribute_gaps: BTreeMap<String, f64>,

    /// Attribute with the largest gap (ties → lexicographically first).
    /// `None` means no disparity: every attribute's gap is 0.0.
    pub worst_case_attribute: Option<String>,

    /// Pass bar supplied by the caller.
    pub threshold: f64,

    /// `overall_fairness >= threshold`.
    pub passed: bool,

    /// Attribute → `min(positive_rate) / max(positive_rate)`.
    #[serde(default)]
    pub disparate_impact: BTreeMap<String, f64>,

    /// Attribute → `max(error_rate) - min(error_rate)`.
    #[serde(default)]
    pub per_attribute_error_gaps: BTreeMap<String, f64>,
}

impl FairnessReport {
    /// `1 - overall_fairness`, the quantity severity bands are defined over.
    pub fn unfairness(&self) -> f64 {
        1.0 - self.overall_fairness
    }
}

/// How urgently a fairness finding must be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// All severities from least to most severe.
    pub const ALL: [Severity; 5] = [
        Severity::None,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// Fixed mitigation playbook for this severity.
    pub fn recommended_actions(self) -> Vec<String> {
        let actions: &[&str] = match self {
            Self::None => &["continue_monitoring"],
            Self::Low => &["monitor_for_drift", "schedule_fairness_review"],
            Self::Medium => &["consider_data_augmentation", "schedule_fairness_review"],
            Self::High => &["flag_for_review", "apply_counterfactual_augmentation"],
            Self::Critical => &[
                "flag_for_review",
                "apply_counterfactual_augmentation",
                "retrain_model",
                "block_promotion",
            ],
        };
        actions.iter().map(|a| a.to_string()).collect()
    }

    /// Whether a mitigation hook should be invoked at all.
    pub fn requires_mitigation(self) -> bool {
        self > Self::None
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Outcome of the Decide stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub severity: Severity,
    pub recommended_actions: Vec<String>,
    /// Attributes whose own gap reaches the lowest severity cut point.
    pub triggering_gaps: BTreeSet<String>,
}

/// Terminal artifact of one OODA cycle. Append-only; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionRecord {
    pub decision_ref: Decision,
    pub executed_at: DateTime<Utc>,
    pub applied: bool,
    pub notes: String,
}
