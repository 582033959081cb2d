use std::collections::BTreeMap;

use fairscope_core::{
    compare, AbTester, BootstrapConfig, EvaluationRecord, FairnessError, Label, ModelComparator,
    Recommendation, TestMethod,
};

#[test]
fn identical_constant_samples_are_inconclusive() {
    let result = compare(&[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0], 0.05).expect("compare");
    assert!((result.p_value - 1.0).abs() < 1e-9);
    assert!(!result.significant);
    assert_eq!(result.recommendation, Recommendation::Inconclusive);
}

#[test]
fn clearly_better_variant_b_is_adopted() {
    let a = vec![0.5; 50];
    let b = vec![0.9; 50];
    let result = compare(&a, &b, 0.05).expect("compare");
    assert!(result.p_value < 0.05);
    assert!(result.significant);
    assert_eq!(result.recommendation, Recommendation::AdoptB);
    assert!((result.variant_a_mean - 0.5).abs() < 1e-12);
    assert!((result.variant_b_mean - 0.9).abs() < 1e-12);
    assert!(serde_json::to_string(&result).is_ok());
}

#[test]
fn undersized_sample_is_insufficient_data() {
    let err = compare(&[1.0], &[1.0, 2.0], 0.05).unwrap_err();
    assert!(matches!(err, FairnessError::InsufficientData(_)));
}

#[test]
fn invalid_alpha_is_rejected() {
    for alpha in [0.0, 1.0, -0.1] {
        let err = compare(&[1.0, 2.0], &[1.0, 2.0], alpha).unwrap_err();
        assert!(matches!(err, FairnessError::Configuration(_)));
    }
}

#[test]
fn worse_variant_b_keeps_a() {
    let a: Vec<f64> = (0..30).map(|i| 0.8 + f64::from(i % 5) * 0.01).collect();
    let b: Vec<f64> = (0..30).map(|i| 0.6 + f64::from(i % 5) * 0.01).collect();
    let result = compare(&a, &b, 0.05).expect("compare");
    assert_eq!(result.recommendation, Recommendation::KeepA);
    assert!(result.percent_change < 0.0);
}

#[test]
fn every_method_agrees_on_separated_samples() {
    let tester = AbTester::default();
    let a: Vec<f64> = (1..=20).map(f64::from).collect();
    let b: Vec<f64> = (21..=40).map(f64::from).collect();
    let bootstrap = BootstrapConfig {
        iterations: 2_000,
        seed: 7,
    };

    let results = [
        tester.welch_t_test(&a, &b).expect("welch"),
        tester.mann_whitney(&a, &b).expect("mann-whitney"),
        tester.bootstrap(&a, &b, &bootstrap).expect("bootstrap"),
    ];
    for r in &results {
        assert_eq!(r.recommendation, Recommendation::AdoptB, "{}", r.method.as_str());
        assert!((0.0..=1.0).contains(&r.p_value));
    }
    assert_eq!(results[1].method, TestMethod::MannWhitney);
}

#[test]
fn bootstrap_is_reproducible_for_a_seed() {
    let tester = AbTester::default();
    let a = [0.61, 0.64, 0.58, 0.70, 0.66, 0.59];
    let b = [0.65, 0.69, 0.62, 0.71, 0.68, 0.66];
    let config = BootstrapConfig {
        iterations: 500,
        seed: 1234,
    };
    let first = tester.bootstrap(&a, &b, &config).expect("bootstrap");
    let second = tester.bootstrap(&a, &b, &config).expect("bootstrap");
    assert_eq!(first, second);
}

#[test]
fn proportion_tests_on_conversion_counts() {
    let tester = AbTester::default();
    let chi = tester.chi_square(&[30, 70], &[60, 40]).expect("chi-square");
    assert!(chi.significant);
    assert_eq!(chi.recommendation, Recommendation::AdoptB);

    let bayes = tester.bayesian(10, 100, 30, 100, (1, 1)).expect("bayesian");
    assert!(bayes.prob_b_better > 0.99);
    assert!((bayes.prob_a_better + bayes.prob_b_better - 1.0).abs() < 1e-12);
    assert_eq!(bayes.recommendation, Recommendation::AdoptB);

    let n = tester.required_sample_size(0.1, 0.2).expect("sample size");
    assert!(n > 1_000);
}

#[test]
fn anova_names_best_variant() {
    let tester = AbTester::default();
    let mut variants = BTreeMap::new();
    variants.insert("control".to_string(), vec![0.50, 0.52, 0.49, 0.51]);
    variants.insert("tuned".to_string(), vec![0.71, 0.69, 0.72, 0.70]);
    variants.insert("distilled".to_string(), vec![0.55, 0.54, 0.56, 0.53]);
    let result = tester.anova(&variants).expect("anova");
    assert!(result.significant);
    assert_eq!(result.best_variant, "tuned");
}

#[test]
fn comparator_ranks_fairer_accurate_model_first() {
    let mut comparator = ModelComparator::new(&["gender"]).expect("comparator");

    let fair: Vec<EvaluationRecord> = ["male", "female"]
        .iter()
        .flat_map(|g| {
            [Label::Positive, Label::Negative]
                .into_iter()
                .map(move |l| EvaluationRecord::new("t", l, l).with_attribute("gender", *g))
        })
        .collect();
    let skewed: Vec<EvaluationRecord> = fair
        .iter()
        .map(|r| {
            let mut r = r.clone();
            if r.attribute("gender") == Some("female") {
                r.predicted_label = Label::Negative;
            }
            r
        })
        .collect();

    comparator.evaluate("fair-v2", &fair, Some(40.0)).expect("evaluate");
    comparator.evaluate("skewed-v1", &skewed, Some(40.0)).expect("evaluate");

    let ranking = comparator.ranking();
    assert_eq!(ranking.len(), 2);
    assert_eq!(ranking[0].model_name, "fair-v2");
    assert_eq!(ranking[0].rank, 1);
    assert!(ranking[0].overall_score > ranking[1].overall_score);

    let report = comparator.render_report().expect("report");
    assert!(report.contains("fair-v2"));
}
