//! Pluggable group-fairness metrics.
//!
//! Each [`BiasMetric`] scores the groups of one attribute and reports whether
//! the value is within its threshold. [`MetricRegistry`] runs a set of metrics
//! over every attribute of an [`Aggregation`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aggregator::Aggregation;
use crate::domain::GroupStat;
use crate::fairness::{impact_ratio, spread};

/// Outcome of one metric over one attribute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricResult {
    pub metric_name: String,
    pub attribute: String,
    pub value: f64,
    pub threshold: f64,
    pub passed: bool,
    pub interpretation: String,
    /// Metric-specific breakdown, e.g. `tpr_gap` or `rate:female`.
    #[serde(default)]
    pub details: BTreeMap<String, f64>,
}

/// A fairness metric computed from the group statistics of one attribute.
pub trait BiasMetric: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Score the groups of `attribute`. Fewer than two groups yields a neutral, passing result.
    fn compute(&self, attribute: &str, groups: &[GroupStat]) -> MetricResult;
}

fn neutral(metric: &dyn BiasMetric, attribute: &str, value: f64, threshold: f64) -> MetricResult {
    MetricResult {
        metric_name: metric.name().to_string(),
        attribute: attribute.to_string(),
        value,
        threshold,
        passed: true,
        interpretation: "not enough groups to compare".to_string(),
        details: BTreeMap::new(),
    }
}

fn verdict(passed: bool, value: f64, threshold: f64, bound: &str) -> String {
    format!(
        "{}: {value:.3} ({} {bound} {threshold})",
        if passed { "fair" } else { "biased" },
        if passed { "within" } else { "violates" }
    )
}

fn per_group(groups: &[GroupStat], prefix: &str, f: impl Fn(&GroupStat) -> f64) -> BTreeMap<String, f64> {
    groups
        .iter()
        .map(|g| (format!("{prefix}:{}", g.group_key.category), f(g)))
        .collect()
}

/// Largest gap in positive-prediction rate; passes at or below the threshold.
#[derive(Debug, Clone)]
pub struct DemographicParity {
    pub threshold: f64,
}

impl Default for DemographicParity {
    fn default() -> Self {
        Self { threshold: 0.1 }
    }
}

impl BiasMetric for DemographicParity {
    fn name(&self) -> &str {
        "demographic_parity"
    }

    fn description(&self) -> &str {
        "difference in positive prediction rates between groups"
    }

    fn compute(&self, attribute: &str, groups: &[GroupStat]) -> MetricResult {
        if groups.len() < 2 {
            return neutral(self, attribute, 0.0, self.threshold);
        }
        let value = spread(groups.iter().map(|g| g.positive_rate));
        let passed = value <= self.threshold;
        MetricResult {
            metric_name: self.name().to_string(),
            attribute: attribute.to_string(),
            value,
            threshold: self.threshold,
            passed,
            interpretation: verdict(passed, value, self.threshold, "max gap"),
            details: per_group(groups, "rate", |g| g.positive_rate),
        }
    }
}

/// Larger of the true-positive-rate and false-positive-rate gaps.
#[derive(Debug, Clone)]
pub struct EqualizedOdds {
    pub threshold: f64,
}

impl Default for EqualizedOdds {
    fn default() -> Self {
        Self { threshold: 0.1 }
    }
}

impl BiasMetric for EqualizedOdds {
    fn name(&self) -> &str {
        "equalized_odds"
    }

    fn description(&self) -> &str {
        "difference in true and false positive rates between groups"
    }

    fn compute(&self, attribute: &str, groups: &[GroupStat]) -> MetricResult {
        if groups.len() < 2 {
            return neutral(self, attribute, 0.0, self.threshold);
        }
        let tpr_gap = spread(groups.iter().map(GroupStat::true_positive_rate));
        let fpr_gap = spread(groups.iter().map(GroupStat::false_positive_rate));
        let value = tpr_gap.max(fpr_gap);
        let passed = value <= self.threshold;

        let mut details = per_group(groups, "tpr", GroupStat::true_positive_rate);
        details.extend(per_group(groups, "fpr", GroupStat::false_positive_rate));
        details.insert("tpr_gap".to_string(), tpr_gap);
        details.insert("fpr_gap".to_string(), fpr_gap);

        MetricResult {
            metric_name: self.name().to_string(),
            attribute: attribute.to_string(),
            value,
            threshold: self.threshold,
            passed,
            interpretation: verdict(passed, value, self.threshold, "max gap"),
            details,
        }
    }
}

/// Ratio of the lowest to the highest positive rate; passes at or above the threshold.
#[derive(Debug, Clone)]
pub struct DisparateImpact {
    pub threshold: f64,
}

impl Default for DisparateImpact {
    fn default() -> Self {
        Self { threshold: 0.8 }
    }
}

impl BiasMetric for DisparateImpact {
    fn name(&self) -> &str {
        "disparate_impact"
    }

    fn description(&self) -> &str {
        "ratio of lowest to highest positive prediction rate"
    }

    fn compute(&self, attribute: &str, groups: &[GroupStat]) -> MetricResult {
        if groups.len() < 2 {
            return neutral(self, attribute, 1.0, self.threshold);
        }
        let value = impact_ratio(groups);
        let passed = value >= self.threshold;
        MetricResult {
            metric_name: self.name().to_string(),
            attribute: attribute.to_string(),
            value,
            threshold: self.threshold,
            passed,
            interpretation: verdict(passed, value, self.threshold, "min ratio"),
            details: per_group(groups, "rate", |g| g.positive_rate),
        }
    }
}

/// Largest gap in precision on the positive class.
#[derive(Debug, Clone)]
pub struct PredictiveParity {
    pub threshold: f64,
}

impl Default for PredictiveParity {
    fn default() -> Self {
        Self { threshold: 0.1 }
    }
}

impl BiasMetric for PredictiveParity {
    fn name(&self) -> &str {
        "predictive_parity"
    }

    fn description(&self) -> &str {
        "difference in precision between groups"
    }

    fn compute(&self, attribute: &str, groups: &[GroupStat]) -> MetricResult {
        if groups.len() < 2 {
            return neutral(self, attribute, 0.0, self.threshold);
        }
        let value = spread(groups.iter().map(GroupStat::precision));
        let passed = value <= self.threshold;
        MetricResult {
            metric_name: self.name().to_string(),
            attribute: attribute.to_string(),
            value,
            threshold: self.threshold,
            passed,
            interpretation: verdict(passed, value, self.threshold, "max gap"),
            details: per_group(groups, "precision", GroupStat::precision),
        }
    }
}

/// Pass/fail tally over a batch of metric results.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MetricSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// 0.0 when no metric ran.
    pub pass_rate: f64,
}

impl MetricSummary {
    pub fn from_results(results: &[MetricResult]) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();
        Self {
            total,
            passed,
            failed: total - passed,
            pass_rate: if total == 0 {
                0.0
            } else {
                passed as f64 / total as f64
            },
        }
    }
}

/// Ordered set of metrics run together.
#[derive(Default)]
pub struct MetricRegistry {
    metrics: Vec<Box<dyn BiasMetric>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the four standard metrics with default thresholds.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(DemographicParity::default()));
        registry.register(Box::new(EqualizedOdds::default()));
        registry.register(Box::new(DisparateImpact::default()));
        registry.register(Box::new(PredictiveParity::default()));
        registry
    }

    /// Add a metric; a metric with the same name replaces the earlier one.
    pub fn register(&mut self, metric: Box<dyn BiasMetric>) {
        self.metrics.retain(|m| m.name() != metric.name());
        self.metrics.push(metric);
    }

    pub fn names(&self) -> Vec<&str> {
        self.metrics.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Run every metric over every attribute, attribute-major.
    pub fn compute_all(&self, aggregation: &Aggregation) -> Vec<MetricResult> {
        aggregation
            .groups
            .iter()
            .flat_map(|(attribute, groups)| {
                self.metrics
                    .iter()
                    .map(move |m| m.compute(attribute, groups))
            })
            .collect()
    }

    pub fn summary(results: &[MetricResult]) -> MetricSummary {
        MetricSummary::from_results(results)
    }
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("metrics", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::aggregate;
    use crate::domain::{EvaluationRecord, Label};

    fn records() -> Vec<EvaluationRecord> {
        // male: 4 predicted positive of 5, all actually positive.
        // female: 2 predicted positive of 5, 3 actually positive.
        let mut out = Vec::new();
        for i in 0..5 {
            let pred = if i < 4 { Label::Positive } else { Label::Negative };
            out.push(EvaluationRecord::new("m", pred, Label::Positive).with_attribute("gender", "male"));
        }
        for i in 0..5 {
            let pred = if i < 2 { Label::Positive } else { Label::Negative };
            let truth = if i < 3 { Label::Positive } else { Label::Negative };
            out.push(EvaluationRecord::new("f", pred, truth).with_attribute("gender", "female"));
        }
        out
    }

    #[test]
    fn test_default_registry_runs_all_metrics() {
        let aggregation = aggregate(&records(), &["gender"]).unwrap();
        let registry = MetricRegistry::with_defaults();
        let results = registry.compute_all(&aggregation);
        assert_eq!(results.len(), 4);

        let by_name: BTreeMap<_, _> = results
            .iter()
            .map(|r| (r.metric_name.as_str(), r))
            .collect();
        assert!((by_name["demographic_parity"].value - 0.4).abs() < 1e-12);
        assert!(!by_name["demographic_parity"].passed);
        assert!((by_name["disparate_impact"].value - 0.5).abs() < 1e-12);
        assert!(!by_name["disparate_impact"].passed);
        // Both groups have precision 1.0.
        assert!(by_name["predictive_parity"].value.abs() < 1e-12);
        assert!(by_name["predictive_parity"].passed);
        // TPR 0.8 vs 2/3; FPR 0 vs 0.
        let eo = by_name["equalized_odds"];
        assert!((eo.value - (0.8 - 2.0 / 3.0)).abs() < 1e-12);
        assert_eq!(eo.details["fpr_gap"], 0.0);

        let summary = MetricRegistry::summary(&results);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 3);
        assert!((summary.pass_rate - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_single_group_is_neutral() {
        let recs: Vec<_> = records()
            .into_iter()
            .filter(|r| r.attribute("gender") == Some("male"))
            .collect();
        let aggregation = aggregate(&recs, &["gender"]).unwrap();
        let results = MetricRegistry::with_defaults().compute_all(&aggregation);
        assert!(results.iter().all(|r| r.passed));
    }

    #[test]
    fn test_register_replaces_by_name() {
        let mut registry = MetricRegistry::with_defaults();
        registry.register(Box::new(DemographicParity { threshold: 0.5 }));
        assert_eq!(registry.len(), 4);
        let aggregation = aggregate(&records(), &["gender"]).unwrap();
        let dp = registry
            .compute_all(&aggregation)
            .into_iter()
            .find(|r| r.metric_name == "demographic_parity")
            .unwrap();
        assert!(dp.passed);
    }

    #[test]
    fn test_empty_summary() {
        let summary = MetricSummary::from_results(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.pass_rate, 0.0);
    }
}
