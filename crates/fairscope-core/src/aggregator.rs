//! Demographic bias aggregation.
//!
//! Partitions evaluation records by each requested attribute's category and
//! derives per-group positive-prediction and error rates. Aggregation is a
//! pure fold over counts, so the result does not depend on record order.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{EvaluationRecord, FairnessError, GroupCounts, GroupKey, GroupStat, Result};

/// Per-attribute group statistics plus the skip tally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Aggregation {
    /// Attribute → groups sorted by category. Empty groups never appear.
    pub groups: BTreeMap<String, Vec<GroupStat>>,
    /// Records excluded for lacking at least one requested attribute.
    pub skipped: usize,
    /// Records that carried every requested attribute.
    pub considered: usize,
}

impl Aggregation {
    /// Total members across the groups of `attribute`.
    pub fn population(&self, attribute: &str) -> usize {
        self.groups
            .get(attribute)
            .map(|groups| groups.iter().map(|g| g.count).sum())
            .unwrap_or(0)
    }

    /// Look up a single group.
    pub fn group(&self, attribute: &str, category: &str) -> Option<&GroupStat> {
        self.groups
            .get(attribute)?
            .iter()
            .find(|g| g.group_key.category == category)
    }

    /// All group stats in attribute, then category order.
    pub fn iter(&self) -> impl Iterator<Item = &GroupStat> {
        self.groups.values().flatten()
    }
}

/// Normalise a caller-supplied attribute list into a sorted, de-duplicated set.
pub fn attribute_set<S: AsRef<str>>(attributes: &[S]) -> Result<BTreeSet<String>> {
    let mut set = BTreeSet::new();
    for attr in attributes {
        let attr = attr.as_ref().trim();
        if attr.is_empty() {
            return Err(FairnessError::config("attribute names must not be blank"));
        }
        set.insert(attr.to_string());
    }
    if set.is_empty() {
        return Err(FairnessError::config("at least one attribute is required"));
    }
    Ok(set)
}

/// Aggregate `records` into per-group statistics for every attribute in `attributes`.
///
/// A record missing any requested attribute is excluded from every attribute's
/// groups and counted in [`Aggregation::skipped`].
///
/// # Errors
///
/// - `Configuration` if `attributes` is empty or no record carries any of them.
/// - `InsufficientData` if `records` is empty.
/// - `SchemaMismatch` if records carry some attributes but every record was skipped.
pub fn aggregate<S: AsRef<str>>(
    records: &[EvaluationRecord],
    attributes: &[S],
) -> Result<Aggregation> {
    let attributes = attribute_set(attributes)?;

    if records.is_empty() {
        return Err(FairnessError::insufficient("no records to aggregate"));
    }

    let any_present = records.iter().any(|r| {
        attributes
            .iter()
            .any(|a| r.demographic_attributes.contains_key(a))
    });
    if !any_present {
        return Err(FairnessError::config(format!(
            "no record contains any of the attributes [{}]",
            join(&attributes)
        )));
    }

    let mut tallies: BTreeMap<&str, BTreeMap<&str, GroupCounts>> = attributes
        .iter()
        .map(|a| (a.as_str(), BTreeMap::new()))
        .collect();
    let mut skipped = 0usize;
    let mut considered = 0usize;

    for record in records {
        let categories: Option<Vec<(&str, &str)>> = attributes
            .iter()
            .map(|a| record.attribute(a).map(|c| (a.as_str(), c)))
            .collect();

        let Some(categories) = categories else {
            skipped += 1;
            continue;
        };

        considered += 1;
        for (attribute, category) in categories {
            if let Some(by_category) = tallies.get_mut(attribute) {
                by_category.entry(category).or_default().observe(record);
            }
        }
    }

    if considered == 0 {
        return Err(FairnessError::SchemaMismatch(format!(
            "all {} records lack at least one of [{}]",
            records.len(),
            join(&attributes)
        )));
    }

    if skipped > 0 {
        warn!(
            event = "aggregate.records_skipped",
            skipped = skipped,
            considered = considered,
            "records missing requested attributes were excluded"
        );
        crate::metrics::METRICS.add_records_skipped(skipped as u64);
    }

    let groups = tallies
        .into_iter()
        .map(|(attribute, by_category)| {
            let stats = by_category
                .into_iter()
                .filter_map(|(category, counts)| {
                    GroupStat::from_counts(GroupKey::new(attribute, category), counts)
                })
                .collect::<Vec<_>>();
            (attribute.to_string(), stats)
        })
        .collect::<BTreeMap<_, _>>();

    debug!(
        attributes = groups.len(),
        considered = considered,
        skipped = skipped,
        "aggregation complete"
    );

    Ok(Aggregation {
        groups,
        skipped,
        considered,
    })
}

fn join(attributes: &BTreeSet<String>) -> String {
    attributes.iter().cloned().collect::<Vec<_>>().join(", ")
}
