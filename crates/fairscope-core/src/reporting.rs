//! Persisted cycle artifacts and human-readable exports.
//!
//! A cycle artifact is written as `<dir>/<cycle_id>/cycle.json` next to a
//! `cycle.digest` file holding the SHA-256 of the JSON bytes. Reading verifies
//! the digest before deserializing.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::aggregator::Aggregation;
use crate::config::PipelineConfig;
use crate::domain::{
    ActionRecord, Decision, FairnessError, FairnessReport, Observation, Result,
};
use crate::ooda::CycleOutcome;

pub const ARTIFACT_SCHEMA_VERSION: &str = "1.0";

const ARTIFACT_FILE: &str = "cycle.json";
const DIGEST_FILE: &str = "cycle.digest";

/// Everything one audit cycle produced, plus the config that drove it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleArtifact {
    pub schema_version: String,
    pub cycle_id: Uuid,
    pub generated_at: DateTime<Utc>,
    /// SHA-256 of the JSON-serialized config.
    pub config_digest: String,
    pub config: PipelineConfig,
    pub observation: Observation,
    pub aggregation: Aggregation,
    pub report: FairnessReport,
    pub decision: Decision,
    pub action: ActionRecord,
}

impl CycleArtifact {
    pub fn from_outcome(outcome: &CycleOutcome, config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            schema_version: ARTIFACT_SCHEMA_VERSION.to_string(),
            cycle_id: outcome.cycle_id,
            generated_at: Utc::now(),
            config_digest: config_digest(config)?,
            config: config.clone(),
            observation: outcome.observation.clone(),
            aggregation: outcome.orientation.aggregation.clone(),
            report: outcome.orientation.report.clone(),
            decision: outcome.decision.clone(),
            action: outcome.action.clone(),
        })
    }
}

/// SHA-256 hex digest of `bytes`.
pub fn digest_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Digest identifying a config; equal configs always share a digest.
pub fn config_digest(config: &PipelineConfig) -> Result<String> {
    Ok(digest_bytes(&serde_json::to_vec(config)?))
}

/// Persist `<dir>/<cycle_id>/cycle.json` and `<dir>/<cycle_id>/cycle.digest`.
pub fn write_cycle_artifact(artifact: &CycleArtifact, dir: &Path) -> Result<PathBuf> {
    let cycle_dir = dir.join(artifact.cycle_id.to_string());
    std::fs::create_dir_all(&cycle_dir)?;

    let path = cycle_dir.join(ARTIFACT_FILE);
    let json = serde_json::to_vec_pretty(artifact)?;
    std::fs::write(&path, &json)?;
    std::fs::write(cycle_dir.join(DIGEST_FILE), digest_bytes(&json))?;

    Ok(path)
}

/// Read `<dir>/<cycle_id>/cycle.json` after verifying its digest.
pub fn read_cycle_artifact(cycle_id: Uuid, dir: &Path) -> Result<CycleArtifact> {
    read_cycle_artifact_at(&dir.join(cycle_id.to_string()))
}

/// Read and verify the artifact stored in `cycle_dir`.
pub fn read_cycle_artifact_at(cycle_dir: &Path) -> Result<CycleArtifact> {
    let json = std::fs::read(cycle_dir.join(ARTIFACT_FILE))?;
    let expected = std::fs::read_to_string(cycle_dir.join(DIGEST_FILE))?;
    let actual = digest_bytes(&json);
    if expected.trim() != actual {
        return Err(FairnessError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }
    Ok(serde_json::from_slice(&json)?)
}

/// Markdown summary of a cycle for PR comments and audit reviews.
pub fn render_cycle_summary_md(artifact: &CycleArtifact) -> String {
    let report = &artifact.report;
    let mut out = String::new();
    out.push_str("# Fairness Audit\n\n");
    let _ = writeln!(out, "- cycle: `{}`", artifact.cycle_id);
    let _ = writeln!(out, "- records: {}", artifact.observation.record_count);
    let _ = writeln!(
        out,
        "- overall fairness: {:.3} (threshold {:.2}, {})",
        report.overall_fairness,
        report.threshold,
        if report.passed { "PASS" } else { "FAIL" }
    );
    let _ = writeln!(out, "- severity: **{}**", artifact.decision.severity);
    if let Some(worst) = &report.worst_case_attribute {
        let _ = writeln!(out, "- worst attribute: `{worst}`");
    }
    if artifact.aggregation.skipped > 0 {
        let _ = writeln!(
            out,
            "- skipped records: {} (missing attributes)",
            artifact.aggregation.skipped
        );
    }

    out.push_str("\n## Attributes\n\n");
    out.push_str("| attribute | rate gap | error gap | disparate impact |\n");
    out.push_str("|---|---|---|---|\n");
    for (attribute, gap) in &report.per_attribute_gaps {
        let error_gap = report.per_attribute_error_gaps.get(attribute).copied();
        let impact = report.disparate_impact.get(attribute).copied();
        let _ = writeln!(
            out,
            "| {attribute} | {gap:.3} | {} | {} |",
            fmt_opt(error_gap),
            fmt_opt(impact)
        );
    }

    out.push_str("\n## Groups\n\n");
    out.push_str("| group | count | positive rate | error rate |\n");
    out.push_str("|---|---|---|---|\n");
    for g in artifact.aggregation.iter() {
        let _ = writeln!(
            out,
            "| {} | {} | {:.3} | {:.3} |",
            g.group_key, g.count, g.positive_rate, g.error_rate
        );
    }

    out.push_str("\n## Action\n\n");
    if artifact.decision.recommended_actions.is_empty() {
        out.push_str("- none\n");
    }
    for action in &artifact.decision.recommended_actions {
        let _ = writeln!(out, "- {action}");
    }
    let _ = writeln!(
        out,
        "\nmitigation applied: {} ({})",
        artifact.action.applied, artifact.action.notes
    );
    out
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"))
}

/// Per-group statistics as CSV, one row per group in attribute then category order.
pub fn render_group_stats_csv(aggregation: &Aggregation) -> String {
    let mut out = String::from(
        "attribute,category,count,positive_rate,error_rate,true_positive_rate,false_positive_rate,precision\n",
    );
    for g in aggregation.iter() {
        let _ = writeln!(
            out,
            "{},{},{},{:.6},{:.6},{:.6},{:.6},{:.6}",
            csv_field(&g.group_key.attribute),
            csv_field(&g.group_key.category),
            g.count,
            g.positive_rate,
            g.error_rate,
            g.true_positive_rate(),
            g.false_positive_rate(),
            g.precision()
        );
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EvaluationRecord, Label};
    use crate::ooda::OodaController;

    fn outcome() -> (CycleOutcome, PipelineConfig) {
        let config = PipelineConfig::for_attributes(&["region"]).with_threshold(0.9);
        let records = vec![
            EvaluationRecord::new("a", Label::Positive, Label::Positive)
                .with_attribute("region", "gulf"),
            EvaluationRecord::new("b", Label::Negative, Label::Positive)
                .with_attribute("region", "levant, north"),
            EvaluationRecord::new("c", Label::Positive, Label::Negative)
                .with_attribute("region", "gulf"),
        ];
        let controller = OodaController::new(&config).unwrap();
        (controller.run_cycle(&records, None).unwrap(), config)
    }

    #[test]
    fn test_artifact_roundtrip_with_digest() {
        let dir = tempfile::tempdir().unwrap();
        let (outcome, config) = outcome();
        let artifact = CycleArtifact::from_outcome(&outcome, &config).unwrap();

        let path = write_cycle_artifact(&artifact, dir.path()).unwrap();
        assert!(path.ends_with("cycle.json"));

        let back = read_cycle_artifact(outcome.cycle_id, dir.path()).unwrap();
        assert_eq!(back, artifact);
    }

    #[test]
    fn test_tampered_artifact_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (outcome, config) = outcome();
        let artifact = CycleArtifact::from_outcome(&outcome, &config).unwrap();
        let path = write_cycle_artifact(&artifact, dir.path()).unwrap();

        let tampered = std::fs::read_to_string(&path)
            .unwrap()
            .replace("\"passed\": false", "\"passed\": true");
        std::fs::write(&path, tampered).unwrap();

        let err = read_cycle_artifact(outcome.cycle_id, dir.path()).unwrap_err();
        assert!(matches!(err, FairnessError::DigestMismatch { .. }));
    }

    #[test]
    fn test_config_digest_is_stable() {
        let config = PipelineConfig::for_attributes(&["gender"]);
        assert_eq!(config_digest(&config).unwrap(), config_digest(&config.clone()).unwrap());
        let other = config.clone().with_threshold(0.5);
        assert_ne!(config_digest(&config).unwrap(), config_digest(&other).unwrap());
        assert_eq!(config_digest(&config).unwrap().len(), 64);
    }

    #[test]
    fn test_markdown_summary() {
        let (outcome, config) = outcome();
        let artifact = CycleArtifact::from_outcome(&outcome, &config).unwrap();
        let md = render_cycle_summary_md(&artifact);
        assert!(md.starts_with("# Fairness Audit"));
        assert!(md.contains("FAIL"));
        assert!(md.contains("| region |"));
        assert!(md.contains("region=gulf"));
    }

    #[test]
    fn test_csv_quotes_fields() {
        let (outcome, _) = outcome();
        let csv = render_group_stats_csv(&outcome.orientation.aggregation);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("attribute,category,count"));
        assert!(lines[1].starts_with("region,gulf,2,"));
        assert!(lines[2].starts_with("region,\"levant, north\",1,"));
    }
}
