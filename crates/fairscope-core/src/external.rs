//! Injected model-backed scorers.
//!
//! Toxicity-style text scores and embedding distances need a model, so they
//! enter only through these traits. The deterministic core never calls them;
//! callers opt in by passing an implementation. Any scorer failure surfaces
//! as [`FairnessError::External`].

use std::collections::BTreeMap;

use crate::aggregator::attribute_set;
use crate::domain::{EvaluationRecord, FairnessError, Result};

/// Scores a single text, e.g. toxicity or sentiment intensity.
pub trait TextScorer: Send + Sync {
    fn score(&self, text: &str) -> anyhow::Result<f64>;
}

/// Maps a text to a fixed-length embedding.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

fn external(context: &str, err: anyhow::Error) -> FairnessError {
    FairnessError::External(format!("{context}: {err:#}"))
}

/// Mean external score per group: attribute → category → mean.
///
/// Records lacking an attribute are left out of that attribute's groups only.
pub fn mean_score_by_group<S: AsRef<str>>(
    records: &[EvaluationRecord],
    attributes: &[S],
    scorer: &dyn TextScorer,
) -> Result<BTreeMap<String, BTreeMap<String, f64>>> {
    let attributes = attribute_set(attributes)?;
    let mut sums: BTreeMap<String, BTreeMap<String, (f64, usize)>> = BTreeMap::new();

    for (i, record) in records.iter().enumerate() {
        let present: Vec<(&String, &str)> = attributes
            .iter()
            .filter_map(|a| record.attribute(a).map(|c| (a, c)))
            .collect();
        if present.is_empty() {
            continue;
        }
        let score = scorer
            .score(&record.input_text)
            .map_err(|e| external(&format!("scoring record {i}"), e))?;
        if !score.is_finite() {
            return Err(FairnessError::External(format!(
                "scorer returned non-finite value for record {i}"
            )));
        }
        for (attribute, category) in present {
            let slot = sums
                .entry(attribute.clone())
                .or_default()
                .entry(category.to_string())
                .or_insert((0.0, 0));
            slot.0 += score;
            slot.1 += 1;
        }
    }

    Ok(sums
        .into_iter()
        .map(|(attribute, groups)| {
            let means = groups
                .into_iter()
                .map(|(category, (sum, n))| (category, sum / n as f64))
                .collect();
            (attribute, means)
        })
        .collect())
}

/// Largest cosine distance between group centroids, per attribute.
///
/// Attributes with fewer than two groups report 0.0. All embeddings must
/// share one dimension.
pub fn centroid_gap_by_attribute<S: AsRef<str>>(
    records: &[EvaluationRecord],
    attributes: &[S],
    embedder: &dyn Embedder,
) -> Result<BTreeMap<String, f64>> {
    let attributes = attribute_set(attributes)?;
    let mut dim: Option<usize> = None;
    let mut centroids: BTreeMap<String, BTreeMap<String, (Vec<f64>, usize)>> = BTreeMap::new();

    for (i, record) in records.iter().enumerate() {
        let present: Vec<(&String, &str)> = attributes
            .iter()
            .filter_map(|a| record.attribute(a).map(|c| (a, c)))
            .collect();
        if present.is_empty() {
            continue;
        }
        let embedding = embedder
            .embed(&record.input_text)
            .map_err(|e| external(&format!("embedding record {i}"), e))?;
        match dim {
            None => dim = Some(embedding.len()),
            Some(d) if d != embedding.len() => {
                return Err(FairnessError::External(format!(
                    "record {i} embedding has dimension {}, expected {d}",
                    embedding.len()
                )));
            }
            Some(_) => {}
        }
        for (attribute, category) in present {
            let (sum, n) = centroids
                .entry(attribute.clone())
                .or_default()
                .entry(category.to_string())
                .or_insert_with(|| (vec![0.0; embedding.len()], 0));
            for (acc, v) in sum.iter_mut().zip(&embedding) {
                *acc += f64::from(*v);
            }
            *n += 1;
        }
    }

    let mut gaps = BTreeMap::new();
    for attribute in &attributes {
        let groups: Vec<Vec<f64>> = centroids
            .get(attribute)
            .map(|g| {
                g.values()
                    .map(|(sum, n)| sum.iter().map(|s| s / *n as f64).collect())
                    .collect()
            })
            .unwrap_or_default();
        let mut gap = 0.0_f64;
        for (i, a) in groups.iter().enumerate() {
            for b in &groups[i + 1..] {
                gap = gap.max(1.0 - cosine_similarity(a, b));
            }
        }
        gaps.insert(attribute.clone(), gap);
    }
    Ok(gaps)
}

fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
