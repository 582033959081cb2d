//! One-way ANOVA across more than two variants.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{check_sample, mean, special, AbTester};
use crate::domain::{FairnessError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnovaResult {
    pub f_statistic: f64,
    pub p_value: f64,
    pub significant: bool,
    pub means: BTreeMap<String, f64>,
    /// Variant with the highest mean; ties go to the first name.
    pub best_variant: String,
}

impl AbTester {
    /// One-way ANOVA F test over named variant samples.
    ///
    /// Needs at least two variants, each non-empty, and more observations
    /// than variants. With zero within-group variance the result is `p = 1`
    /// when all means agree and `p = 0` otherwise.
    pub fn anova(&self, variants: &BTreeMap<String, Vec<f64>>) -> Result<AnovaResult> {
        if variants.len() < 2 {
            return Err(FairnessError::insufficient(format!(
                "anova needs at least 2 variants, got {}",
                variants.len()
            )));
        }
        for (name, sample) in variants {
            check_sample(name, sample, 1)?;
        }

        let k = variants.len() as f64;
        let n: f64 = variants.values().map(|v| v.len() as f64).sum();
        if n <= k {
            return Err(FairnessError::insufficient(format!(
                "anova needs more observations ({n}) than variants ({k})"
            )));
        }

        let means: BTreeMap<String, f64> = variants
            .iter()
            .map(|(name, sample)| (name.clone(), mean(sample)))
            .collect();
        let grand = variants.values().flatten().sum::<f64>() / n;

        let between: f64 = variants
            .iter()
            .map(|(name, sample)| sample.len() as f64 * (means[name] - grand).powi(2))
            .sum();
        let within: f64 = variants
            .iter()
            .map(|(name, sample)| sample.iter().map(|v| (v - means[name]).powi(2)).sum::<f64>())
            .sum();

        let (d1, d2) = (k - 1.0, n - k);
        let (f_statistic, p_value) = if within <= 0.0 {
            if between <= 0.0 {
                (0.0, 1.0)
            } else {
                (f64::MAX, 0.0)
            }
        } else {
            let f = (between / d1) / (within / d2);
            (f, special::f_survival(f, d1, d2))
        };

        let mut best_variant = String::new();
        let mut best_mean = f64::NEG_INFINITY;
        for (name, m) in &means {
            if *m > best_mean {
                best_mean = *m;
                best_variant = name.clone();
            }
        }

        Ok(AnovaResult {
            f_statistic,
            p_value,
            significant: p_value < self.alpha,
            means,
            best_variant,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variants(entries: Vec<(&str, Vec<f64>)>) -> BTreeMap<String, Vec<f64>> {
        entries
            .into_iter()
            .map(|(name, values)| (name.to_string(), values))
            .collect()
    }

    #[test]
    fn test_anova_reference_value() {
        // Between SS 42 over 2 dof, within SS 6 over 6 dof: F = 21.
        let input = variants(vec![
            ("baseline", vec![1.0, 2.0, 3.0]),
            ("debiased", vec![2.0, 3.0, 4.0]),
            ("augmented", vec![6.0, 7.0, 8.0]),
        ]);
        let result = AbTester::default().anova(&input).unwrap();
        assert!((result.f_statistic - 21.0).abs() < 1e-9);
        assert!(result.p_value < 0.01);
        assert!(result.significant);
        assert_eq!(result.best_variant, "augmented");
    }

    #[test]
    fn test_anova_identical_groups() {
        let input = variants(vec![("a", vec![1.0, 1.0]), ("b", vec![1.0, 1.0])]);
        let result = AbTester::default().anova(&input).unwrap();
        assert_eq!(result.p_value, 1.0);
        assert!(!result.significant);
        assert_eq!(result.best_variant, "a");
    }

    #[test]
    fn test_anova_needs_two_variants() {
        let input = variants(vec![("only", vec![1.0, 2.0])]);
        assert!(matches!(
            AbTester::default().anova(&input),
            Err(FairnessError::InsufficientData(_))
        ));
    }
}
