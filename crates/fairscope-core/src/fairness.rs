//! Fairness metric calculation.
//!
//! Turns per-group statistics into a [`FairnessReport`]. The aggregate score is
//! `1 - weighted_mean(rate_gap)`, each attribute weighted by its member count
//! so sparse categories cannot dominate.

use std::collections::BTreeMap;

use tracing::debug;

use crate::aggregator::Aggregation;
use crate::domain::{FairnessError, FairnessReport, GroupStat, Result};

/// Compute the fairness report for `groups` against a caller-supplied `threshold`.
///
/// # Errors
///
/// `Configuration` if `groups` is empty, holds no populated group, or
/// `threshold` is outside 0.0–1.0.
pub fn compute_fairness(
    groups: &BTreeMap<String, Vec<GroupStat>>,
    threshold: f64,
) -> Result<FairnessReport> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(FairnessError::config(format!(
            "fairness threshold {threshold} must be within [0, 1]"
        )));
    }
    if groups.is_empty() {
        return Err(FairnessError::config("group statistics must not be empty"));
    }

    let mut per_attribute_gaps = BTreeMap::new();
    let mut per_attribute_error_gaps = BTreeMap::new();
    let mut disparate_impact = BTreeMap::new();
    let mut weighted_gap = 0.0;
    let mut total_weight = 0usize;
    let mut worst: Option<(&str, f64)> = None;

    for (attribute, stats) in groups {
        let gap = spread(stats.iter().map(|g| g.positive_rate));
        let error_gap = spread(stats.iter().map(|g| g.error_rate));
        let weight: usize = stats.iter().map(|g| g.count).sum();

        weighted_gap += gap * weight as f64;
        total_weight += weight;

        // BTreeMap iteration is ascending, so strict `>` keeps the first name on ties.
        if gap > 0.0 && worst.map_or(true, |(_, best)| gap > best) {
            worst = Some((attribute.as_str(), gap));
        }

        per_attribute_gaps.insert(attribute.clone(), gap);
        per_attribute_error_gaps.insert(attribute.clone(), error_gap);
        disparate_impact.insert(attribute.clone(), impact_ratio(stats));
    }

    if total_weight == 0 {
        return Err(FairnessError::config(
            "group statistics contain no populated groups",
        ));
    }

    let overall_fairness = (1.0 - weighted_gap / total_weight as f64).clamp(0.0, 1.0);
    let passed = overall_fairness >= threshold;

    debug!(
        overall_fairness = overall_fairness,
        threshold = threshold,
        passed = passed,
        "fairness computed"
    );

    Ok(FairnessReport {
        overall_fairness,
        per_attribute_gaps,
        worst_case_attribute: worst.map(|(name, _)| name.to_string()),
        threshold,
        passed,
        disparate_impact,
        per_attribute_error_gaps,
    })
}

/// Convenience wrapper over an [`Aggregation`].
pub fn compute_fairness_for(aggregation: &Aggregation, threshold: f64) -> Result<FairnessReport> {
    compute_fairness(&aggregation.groups, threshold)
}

/// `max - min` of the values; 0.0 for fewer than two values.
pub(crate) fn spread(values: impl Iterator<Item = f64>) -> f64 {
    let (min, max, n) = values.fold((f64::INFINITY, f64::NEG_INFINITY, 0usize), |(lo, hi, n), v| {
        (lo.min(v), hi.max(v), n + 1)
    });
    if n < 2 {
        0.0
    } else {
        max - min
    }
}

/// Disparate impact ratio `min_rate / max_rate`; parity (1.0) when no group is predicted positive.
pub(crate) fn impact_ratio(stats: &[GroupStat]) -> f64 {
    let max = stats.iter().map(|g| g.positive_rate).fold(0.0, f64::max);
    if stats.len() < 2 || max == 0.0 {
        return 1.0;
    }
    let min = stats
        .iter()
        .map(|g| g.positive_rate)
        .fold(f64::INFINITY, f64::min);
    min / max
}
