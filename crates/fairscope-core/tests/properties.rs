use fairscope_core::{
    aggregate, compute_fairness, ActionRecord, Decision, EvaluationRecord, FairnessReport, Label,
    SeverityPolicy,
};
use proptest::prelude::*;

fn label() -> impl Strategy<Value = Label> {
    prop_oneof![
        Just(Label::Positive),
        Just(Label::Negative),
        Just(Label::Neutral)
    ]
}

fn record() -> impl Strategy<Value = EvaluationRecord> {
    (label(), label(), 0usize..3, 0usize..4).prop_map(|(pred, truth, g, r)| {
        EvaluationRecord::new("sample text", pred, truth)
            .with_attribute("gender", ["male", "female", "nonbinary"][g])
            .with_attribute("region", ["gulf", "levant", "maghreb", "egypt"][r])
    })
}

fn batch() -> impl Strategy<Value = Vec<EvaluationRecord>> {
    prop::collection::vec(record(), 1..60)
}

proptest! {
    #[test]
    fn group_counts_sum_to_batch_size(records in batch()) {
        let agg = aggregate(&records, &["gender", "region"]).unwrap();
        prop_assert_eq!(agg.skipped, 0);
        for attribute in ["gender", "region"] {
            prop_assert_eq!(agg.population(attribute), records.len());
        }
    }

    #[test]
    fn fairness_ignores_record_order(records in batch()) {
        let forward = aggregate(&records, &["gender", "region"]).unwrap();
        let mut reversed = records.clone();
        reversed.reverse();
        let backward = aggregate(&reversed, &["gender", "region"]).unwrap();

        let a = compute_fairness(&forward.groups, 0.8).unwrap();
        let b = compute_fairness(&backward.groups, 0.8).unwrap();
        prop_assert_eq!(a.overall_fairness, b.overall_fairness);
        prop_assert_eq!(a.per_attribute_gaps, b.per_attribute_gaps);
    }

    #[test]
    fn fairness_stays_in_unit_interval(records in batch(), threshold in 0.0f64..=1.0) {
        let agg = aggregate(&records, &["gender", "region"]).unwrap();
        let report = compute_fairness(&agg.groups, threshold).unwrap();
        prop_assert!((0.0..=1.0).contains(&report.overall_fairness));
        prop_assert_eq!(report.passed, report.overall_fairness >= threshold);
        for gap in report.per_attribute_gaps.values() {
            prop_assert!((0.0..=1.0).contains(gap));
        }
    }

    #[test]
    fn single_group_has_zero_gap(labels in prop::collection::vec((label(), label()), 1..40)) {
        let records: Vec<_> = labels
            .into_iter()
            .map(|(p, t)| EvaluationRecord::new("x", p, t).with_attribute("gender", "female"))
            .collect();
        let agg = aggregate(&records, &["gender"]).unwrap();
        let report = compute_fairness(&agg.groups, 0.8).unwrap();
        prop_assert_eq!(report.per_attribute_gaps["gender"], 0.0);
        prop_assert_eq!(report.overall_fairness, 1.0);
        prop_assert!(report.passed);
    }

    #[test]
    fn severity_is_monotone(u in 0.0f64..=1.0, v in 0.0f64..=1.0) {
        let policy = SeverityPolicy::default();
        let (lo, hi) = if u <= v { (u, v) } else { (v, u) };
        prop_assert!(policy.classify(lo) <= policy.classify(hi));
    }

    #[test]
    fn reports_and_actions_survive_json(records in batch()) {
        let agg = aggregate(&records, &["gender", "region"]).unwrap();
        let report = compute_fairness(&agg.groups, 0.8).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        let back: FairnessReport = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(&back, &report);

        let severity = SeverityPolicy::default().classify(report.unfairness());
        let decision = Decision {
            severity,
            recommended_actions: severity.recommended_actions(),
            triggering_gaps: report.per_attribute_gaps.keys().cloned().collect(),
        };
        let action = ActionRecord {
            decision_ref: decision,
            executed_at: chrono::Utc::now(),
            applied: false,
            notes: "recorded".to_string(),
        };
        let json = serde_json::to_string(&action).unwrap();
        let back: ActionRecord = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, action);
    }
}
