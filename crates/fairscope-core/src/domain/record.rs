//! Input records and per-group statistics.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentiment label attached to a prediction or a ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Positive,
    Negative,
    Neutral,
}

impl Label {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Self::Positive),
            "negative" => Ok(Self::Negative),
            "neutral" => Ok(Self::Neutral),
            other => Err(format!("unknown label: {other}")),
        }
    }
}

/// One labeled prediction with its demographic attributes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationRecord {
    /// Text the model classified.
    pub input_text: String,

    /// Label produced by the model.
    pub predicted_label: Label,

    /// Reference label.
    pub ground_truth_label: Label,

    /// Attribute name → category value (e.g. `gender → female`).
    #[serde(default)]
    pub demographic_attributes: BTreeMap<String, String>,

    /// When the prediction was produced; defaults to load time.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl EvaluationRecord {
    /// Create a record with no demographic attributes, timestamped now.
    pub fn new(input_text: impl Into<String>, predicted: Label, ground_truth: Label) -> Self {
        Self {
            input_text: input_text.into(),
            predicted_label: predicted,
            ground_truth_label: ground_truth,
            demographic_attributes: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach a demographic attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, category: impl Into<String>) -> Self {
        self.demographic_attributes
            .insert(name.into(), category.into());
        self
    }

    /// Override the timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Category value for `attribute`, if present.
    pub fn attribute(&self, attribute: &str) -> Option<&str> {
        self.demographic_attributes
            .get(attribute)
            .map(String::as_str)
    }

    pub fn is_predicted_positive(&self) -> bool {
        self.predicted_label == Label::Positive
    }

    pub fn is_actual_positive(&self) -> bool {
        self.ground_truth_label == Label::Positive
    }

    pub fn is_error(&self) -> bool {
        self.predicted_label != self.ground_truth_label
    }
}

/// Logical type of an observed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Label,
    Timestamp,
    Category,
}

/// Column names of the fixed part of every record.
pub const TEXT_COLUMN: &str = "input_text";
pub const PREDICTED_COLUMN: &str = "predicted_label";
pub const GROUND_TRUTH_COLUMN: &str = "ground_truth_label";
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Batch metadata captured by the Observe stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub record_count: usize,
    pub column_names: BTreeSet<String>,
    pub collected_at: DateTime<Utc>,
    pub schema_snapshot: BTreeMap<String, ColumnType>,
    /// Attribute column → number of records lacking it.
    #[serde(default)]
    pub missing_attribute_counts: BTreeMap<String, usize>,
}

/// Identifies one demographic slice.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub attribute: String,
    pub category: String,
}

impl GroupKey {
    pub fn new(attribute: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            category: category.into(),
        }
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.attribute, self.category)
    }
}

/// Raw tallies for one group. Every rate in [`GroupStat`] derives from these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCounts {
    pub count: usize,
    pub predicted_positive: usize,
    pub actual_positive: usize,
    pub true_positive: usize,
    pub errors: usize,
}

impl GroupCounts {
    /// Fold one record into the tallies.
    pub fn observe(&mut self, record: &EvaluationRecord) {
        self.count += 1;
        let predicted = record.is_predicted_positive();
        let actual = record.is_actual_positive();
        if predicted {
            self.predicted_positive += 1;
        }
        if actual {
            self.actual_positive += 1;
        }
        if predicted && actual {
            self.true_positive += 1;
        }
        if record.is_error() {
            self.errors += 1;
        }
    }
}

/// Prediction and error rates for one demographic group.
///
/// # Invariants
///
/// `count > 0`; `positive_rate` and `error_rate` are `counts.* / count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStat {
    pub group_key: GroupKey,
    pub count: usize,
    pub positive_rate: f64,
    pub error_rate: f64,
    pub counts: GroupCounts,
}

impl GroupStat {
    /// Derive rates from tallies. Returns `None` for an empty group.
    pub fn from_counts(group_key: GroupKey, counts: GroupCounts) -> Option<Self> {
        if counts.count == 0 {
            return None;
        }
        let n = counts.count as f64;
        Some(Self {
            group_key,
            count: counts.count,
            positive_rate: counts.predicted_positive as f64 / n,
            error_rate: counts.errors as f64 / n,
            counts,
        })
    }

    /// Recall on the positive class; 0.0 when the group has no actual positives.
    pub fn true_positive_rate(&self) -> f64 {
        ratio(self.counts.true_positive, self.counts.actual_positive)
    }

    /// Share of actual non-positives predicted positive.
    pub fn false_positive_rate(&self) -> f64 {
        let false_positive = self.counts.predicted_positive - self.counts.true_positive;
        let actual_negative = self.counts.count - self.counts.actual_positive;
        ratio(false_positive, actual_negative)
    }

    /// Precision on the positive class; 0.0 when nothing was predicted positive.
    pub fn precision(&self) -> f64 {
        ratio(self.counts.true_positive, self.counts.predicted_positive)
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
