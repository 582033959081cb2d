//! Side-by-side comparison of several models evaluated on the same batch.
//!
//! Each model is scored on accuracy, support-weighted precision/recall/F1,
//! and a bias score (mean demographic-parity gap over the configured
//! attributes). Models are ranked by a fixed blend of those scores plus an
//! optional latency term.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregator::attribute_set;
use crate::domain::{EvaluationRecord, FairnessError, GroupCounts, Label, Result};
use crate::fairness::spread;

const WEIGHT_ACCURACY: f64 = 0.3;
const WEIGHT_F1: f64 = 0.3;
const WEIGHT_FAIRNESS: f64 = 0.2;
const WEIGHT_LATENCY: f64 = 0.2;

/// Scores for one evaluated model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMetrics {
    pub model_name: String,
    pub record_count: usize,
    pub accuracy: f64,
    /// Support-weighted over the labels present in the batch.
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// Mean positive-rate gap over attributes with at least two groups; lower is better.
    pub bias_score: f64,
    /// `1 - bias_score`.
    pub fairness_score: f64,
    /// Mean inference latency per record, if measured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
}

/// One row of the overall ranking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedModel {
    pub rank: usize,
    pub model_name: String,
    pub overall_score: f64,
}

/// Collects per-model metrics and ranks them.
#[derive(Debug, Clone)]
pub struct ModelComparator {
    attributes: BTreeSet<String>,
    results: BTreeMap<String, ModelMetrics>,
}

impl ModelComparator {
    pub fn new<S: AsRef<str>>(attributes: &[S]) -> Result<Self> {
        Ok(Self {
            attributes: attribute_set(attributes)?,
            results: BTreeMap::new(),
        })
    }

    /// Score one model's predictions; re-evaluating a name replaces its entry.
    pub fn evaluate(
        &mut self,
        model_name: &str,
        records: &[EvaluationRecord],
        latency_ms: Option<f64>,
    ) -> Result<&ModelMetrics> {
        if records.is_empty() {
            return Err(FairnessError::insufficient(format!(
                "model {model_name} has no predictions"
            )));
        }
        if let Some(latency) = latency_ms {
            if !(latency.is_finite() && latency >= 0.0) {
                return Err(FairnessError::config(format!(
                    "model {model_name}: latency {latency} must be a non-negative number"
                )));
            }
        }

        let n = records.len() as f64;
        let correct = records.iter().filter(|r| !r.is_error()).count() as f64;
        let (precision, recall, f1_score) = weighted_scores(records);
        let bias_score = self.bias_score(records);

        let metrics = ModelMetrics {
            model_name: model_name.to_string(),
            record_count: records.len(),
            accuracy: correct / n,
            precision,
            recall,
            f1_score,
            bias_score,
            fairness_score: 1.0 - bias_score,
            latency_ms,
        };
        info!(
            event = "comparison.model_evaluated",
            model = %model_name,
            accuracy = metrics.accuracy,
            f1 = metrics.f1_score,
            bias = metrics.bias_score,
        );

        self.results.insert(model_name.to_string(), metrics);
        self.results
            .get(model_name)
            .ok_or_else(|| FairnessError::config(format!("model {model_name} was not stored")))
    }

    pub fn results(&self) -> impl Iterator<Item = &ModelMetrics> {
        self.results.values()
    }

    /// Rank by `0.3·accuracy + 0.3·f1 + 0.2·fairness + 0.2·(1 - latency/max_latency)`.
    ///
    /// When no model reports latency the latency term is full for everyone;
    /// otherwise a model without latency gets none of it. Ties rank by name.
    pub fn ranking(&self) -> Vec<RankedModel> {
        let max_latency = self
            .results
            .values()
            .filter_map(|m| m.latency_ms)
            .fold(0.0_f64, f64::max);

        let mut scored: Vec<(&str, f64)> = self
            .results
            .values()
            .map(|m| {
                let latency_term = match (m.latency_ms, max_latency > 0.0) {
                    (_, false) => 1.0,
                    (Some(t), true) => 1.0 - t / max_latency,
                    (None, true) => 0.0,
                };
                let score = WEIGHT_ACCURACY * m.accuracy
                    + WEIGHT_F1 * m.f1_score
                    + WEIGHT_FAIRNESS * m.fairness_score
                    + WEIGHT_LATENCY * latency_term;
                (m.model_name.as_str(), score)
            })
            .collect();
        // `results` iterates by name, and the sort is stable.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        scored
            .into_iter()
            .enumerate()
            .map(|(i, (name, score))| RankedModel {
                rank: i + 1,
                model_name: name.to_string(),
                overall_score: score,
            })
            .collect()
    }

    /// Plain-text comparison report.
    pub fn render_report(&self) -> Result<String> {
        if self.results.is_empty() {
            return Err(FairnessError::insufficient("no models have been evaluated"));
        }

        let rule = "=".repeat(72);
        let mut out = String::new();
        let _ = writeln!(out, "{rule}\nMODEL COMPARISON REPORT\n{rule}\n");
        let _ = writeln!(
            out,
            "{:<20} {:>8} {:>9} {:>8} {:>8} {:>8} {:>10}",
            "model", "accuracy", "precision", "recall", "f1", "bias", "latency_ms"
        );
        for m in self.results.values() {
            let latency = m
                .latency_ms
                .map(|t| format!("{t:.2}"))
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "{:<20} {:>8.3} {:>9.3} {:>8.3} {:>8.3} {:>8.3} {:>10}",
                m.model_name, m.accuracy, m.precision, m.recall, m.f1_score, m.bias_score, latency
            );
        }

        let _ = writeln!(out, "\nBEST MODELS:");
        let best = |pick: fn(&ModelMetrics) -> f64, highest: bool| {
            let mut iter = self.results.values();
            let first = iter.next().map(|m| (m.model_name.as_str(), pick(m)));
            iter.fold(first, |acc, m| match acc {
                Some((_, v)) if (highest && pick(m) > v) || (!highest && pick(m) < v) => {
                    Some((m.model_name.as_str(), pick(m)))
                }
                other => other,
            })
            .map(|(name, _)| name)
            .unwrap_or("-")
        };
        let _ = writeln!(out, "  Highest accuracy: {}", best(|m| m.accuracy, true));
        let _ = writeln!(out, "  Highest F1:       {}", best(|m| m.f1_score, true));
        let _ = writeln!(out, "  Lowest bias:      {}", best(|m| m.bias_score, false));

        let _ = writeln!(out, "\nOVERALL RANKING:");
        for row in self.ranking() {
            let _ = writeln!(
                out,
                "  {}. {} (score: {:.3})",
                row.rank, row.model_name, row.overall_score
            );
        }
        let _ = writeln!(out, "\n{rule}");
        Ok(out)
    }

    fn bias_score(&self, records: &[EvaluationRecord]) -> f64 {
        let gaps: Vec<f64> = self
            .attributes
            .iter()
            .filter_map(|attr| {
                let mut by_category: BTreeMap<&str, GroupCounts> = BTreeMap::new();
                for r in records {
                    if let Some(category) = r.attribute(attr) {
                        by_category.entry(category).or_default().observe(r);
                    }
                }
                (by_category.len() > 1).then(|| {
                    spread(
                        by_category
                            .values()
                            .map(|c| c.predicted_positive as f64 / c.count as f64),
                    )
                })
            })
            .collect();
        if gaps.is_empty() {
            0.0
        } else {
            gaps.iter().sum::<f64>() / gaps.len() as f64
        }
    }
}

/// Support-weighted precision, recall, and F1 across labels.
///
/// Labels never predicted score 0 precision; labels absent from the ground
/// truth carry no weight.
fn weighted_scores(records: &[EvaluationRecord]) -> (f64, f64, f64) {
    let labels: BTreeSet<Label> = records
        .iter()
        .flat_map(|r| [r.predicted_label, r.ground_truth_label])
        .collect();
    let n = records.len() as f64;

    let (mut precision, mut recall, mut f1) = (0.0, 0.0, 0.0);
    for label in labels {
        let support = records.iter().filter(|r| r.ground_truth_label == label).count();
        if support == 0 {
            continue;
        }
        let predicted = records.iter().filter(|r| r.predicted_label == label).count();
        let tp = records
            .iter()
            .filter(|r| r.predicted_label == label && r.ground_truth_label == label)
            .count();

        let p = if predicted == 0 {
            0.0
        } else {
            tp as f64 / predicted as f64
        };
        let rc = tp as f64 / support as f64;
        let f = if p + rc == 0.0 {
            0.0
        } else {
            2.0 * p * rc / (p + rc)
        };

        let weight = support as f64 / n;
        precision += weight * p;
        recall += weight * rc;
        f1 += weight * f;
    }
    (precision, recall, f1)
}
