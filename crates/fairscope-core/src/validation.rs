//! Input validation for evaluation batches.
//!
//! Runs before the OODA cycle to catch batches that are too small or
//! dominated by duplicates. Missing demographic attributes only produce
//! warnings; the aggregator already tolerates them by skipping records.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::{EvaluationRecord, FairnessError, Label, Result};

/// Limits applied by [`validate_records`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationPolicy {
    pub min_records: usize,
    /// Per-attribute share of records allowed to lack the attribute before warning.
    pub max_missing_ratio: f64,
    /// Share of exact duplicate records that fails validation.
    pub max_duplicate_ratio: f64,
    pub max_text_len: usize,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            min_records: 1,
            max_missing_ratio: 0.1,
            max_duplicate_ratio: 0.5,
            max_text_len: 10_000,
        }
    }
}

impl ValidationPolicy {
    pub fn validate(&self) -> Result<()> {
        for (name, ratio) in [
            ("max_missing_ratio", self.max_missing_ratio),
            ("max_duplicate_ratio", self.max_duplicate_ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(FairnessError::config(format!(
                    "validation.{name} {ratio} must be within [0, 1]"
                )));
            }
        }
        Ok(())
    }
}

/// Summary of a validated batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub record_count: usize,
    pub duplicate_count: usize,
    pub empty_text_count: usize,
    pub overlong_text_count: usize,
    /// Attribute → share of records lacking it.
    pub missing_ratios: BTreeMap<String, f64>,
    pub predicted_distribution: BTreeMap<Label, usize>,
    pub ground_truth_distribution: BTreeMap<Label, usize>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Validate `records` against `policy` for the given `attributes`.
///
/// # Errors
///
/// `Validation` when the batch is smaller than `min_records` or its duplicate
/// share exceeds `max_duplicate_ratio`.
pub fn validate_records<S: AsRef<str>>(
    records: &[EvaluationRecord],
    attributes: &[S],
    policy: &ValidationPolicy,
) -> Result<ValidationReport> {
    if records.len() < policy.min_records.max(1) {
        return Err(FairnessError::Validation(format!(
            "batch has {} records, minimum required: {}",
            records.len(),
            policy.min_records.max(1)
        )));
    }

    let n = records.len();
    let mut seen = HashSet::new();
    let mut duplicate_count = 0usize;
    let mut empty_text_count = 0usize;
    let mut overlong_text_count = 0usize;
    let mut predicted_distribution = BTreeMap::new();
    let mut ground_truth_distribution = BTreeMap::new();

    for r in records {
        let key = (
            r.input_text.as_str(),
            r.predicted_label,
            r.ground_truth_label,
            &r.demographic_attributes,
        );
        if !seen.insert(key) {
            duplicate_count += 1;
        }
        let len = r.input_text.trim().chars().count();
        if len == 0 {
            empty_text_count += 1;
        } else if len > policy.max_text_len {
            overlong_text_count += 1;
        }
        *predicted_distribution.entry(r.predicted_label).or_insert(0) += 1;
        *ground_truth_distribution
            .entry(r.ground_truth_label)
            .or_insert(0) += 1;
    }

    let duplicate_ratio = duplicate_count as f64 / n as f64;
    if duplicate_ratio > policy.max_duplicate_ratio {
        return Err(FairnessError::Validation(format!(
            "{duplicate_count} of {n} records are duplicates ({:.1}% > {:.1}%)",
            duplicate_ratio * 100.0,
            policy.max_duplicate_ratio * 100.0
        )));
    }

    let mut warnings = Vec::new();
    let mut missing_ratios = BTreeMap::new();
    for attr in attributes {
        let attr = attr.as_ref();
        let missing = records.iter().filter(|r| r.attribute(attr).is_none()).count();
        let ratio = missing as f64 / n as f64;
        if ratio > policy.max_missing_ratio {
            warnings.push(format!(
                "attribute '{attr}' missing in {:.1}% of records (max {:.1}%)",
                ratio * 100.0,
                policy.max_missing_ratio * 100.0
            ));
        }
        missing_ratios.insert(attr.to_string(), ratio);
    }
    if empty_text_count > 0 {
        warnings.push(format!("{empty_text_count} records have empty input_text"));
    }
    if overlong_text_count > 0 {
        warnings.push(format!(
            "{overlong_text_count} records exceed {} characters",
            policy.max_text_len
        ));
    }
    if predicted_distribution.len() == 1 {
        warnings.push("model predicted a single label for every record".to_string());
    }

    Ok(ValidationReport {
        record_count: n,
        duplicate_count,
        empty_text_count,
        overlong_text_count,
        missing_ratios,
        predicted_distribution,
        ground_truth_distribution,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(text: &str, pred: Label, gender: Option<&str>) -> EvaluationRecord {
        let r = EvaluationRecord::new(text, pred, Label::Positive);
        match gender {
            Some(g) => r.with_attribute("gender", g),
            None => r,
        }
    }

    #[test]
    fn test_clean_batch() {
        let records = vec![
            rec("a", Label::Positive, Some("male")),
            rec("b", Label::Negative, Some("female")),
        ];
        let report = validate_records(&records, &["gender"], &ValidationPolicy::default()).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.missing_ratios["gender"], 0.0);
        assert_eq!(report.predicted_distribution[&Label::Positive], 1);
    }

    #[test]
    fn test_too_few_records() {
        let policy = ValidationPolicy {
            min_records: 3,
            ..ValidationPolicy::default()
        };
        let records = vec![rec("a", Label::Positive, Some("male"))];
        let err = validate_records(&records, &["gender"], &policy).unwrap_err();
        assert!(matches!(err, FairnessError::Validation(_)));
    }

    #[test]
    fn test_empty_batch_rejected() {
        let err = validate_records(&[], &["gender"], &ValidationPolicy::default()).unwrap_err();
        assert!(matches!(err, FairnessError::Validation(_)));
    }

    #[test]
    fn test_duplicates_rejected() {
        let r = rec("same", Label::Positive, Some("male"));
        let records = vec![r.clone(), r.clone(), r];
        let err =
            validate_records(&records, &["gender"], &ValidationPolicy::default()).unwrap_err();
        assert!(err.to_string().contains("duplicates"));
    }

    #[test]
    fn test_missing_attribute_warns() {
        let records = vec![
            rec("a", Label::Positive, Some("male")),
            rec("b", Label::Negative, None),
        ];
        let report = validate_records(&records, &["gender"], &ValidationPolicy::default()).unwrap();
        assert_eq!(report.missing_ratios["gender"], 0.5);
        assert!(report.warnings.iter().any(|w| w.contains("gender")));
    }

    #[test]
    fn test_single_predicted_label_warns() {
        let records = vec![
            rec("a", Label::Neutral, Some("male")),
            rec("b", Label::Neutral, Some("female")),
        ];
        let report = validate_records(&records, &["gender"], &ValidationPolicy::default()).unwrap();
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("single label")));
    }
}
