//! Fairscope Core Library
//!
//! Demographic fairness auditing for classifier predictions: bias
//! aggregation, population-weighted fairness scoring, an OODA audit cycle,
//! and A/B statistical comparison of model variants.

pub mod ab;
pub mod aggregator;
pub mod audit;
pub mod bias_metrics;
pub mod comparison;
pub mod config;
pub mod domain;
pub mod external;
pub mod fairness;
pub mod metrics;
pub mod obs;
pub mod ooda;
pub mod reporting;
pub mod telemetry;
pub mod validation;

pub use domain::{
    ActionRecord, ColumnType, Decision, EvaluationRecord, FairnessError, FairnessReport,
    GroupCounts, GroupKey, GroupStat, Label, Observation, Result, Severity,
};

pub use aggregator::{aggregate, Aggregation};
pub use fairness::{compute_fairness, compute_fairness_for};

pub use ooda::{
    CycleOutcome, CyclePhase, MitigationHook, OodaController, Orientation, SeverityPolicy,
};

pub use ab::{
    compare, ABTestResult, AbTester, AnovaResult, BayesianResult, Recommendation, TestMethod,
};

pub use audit::{AuditEntry, AuditLog, JsonlAuditLog, MemoryAuditLog};
pub use bias_metrics::{BiasMetric, MetricRegistry, MetricResult, MetricSummary};
pub use comparison::{ModelComparator, ModelMetrics, RankedModel};
pub use config::{BootstrapConfig, PipelineConfig};
pub use external::{Embedder, TextScorer};
pub use reporting::{
    read_cycle_artifact, render_cycle_summary_md, render_group_stats_csv, write_cycle_artifact,
    CycleArtifact,
};
pub use validation::{validate_records, ValidationPolicy, ValidationReport};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
