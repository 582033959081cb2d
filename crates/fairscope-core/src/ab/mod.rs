//! A/B statistical comparison of two model variants.
//!
//! [`compare`] is the canonical entry point: Welch's t-test over two metric
//! samples. [`AbTester`] bundles it with the rest of the suite (rank,
//! resampling, categorical, Bayesian, power, and multi-variant tests).

mod anova;
mod proportions;
mod resampling;
pub mod special;

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_ALPHA, PipelineConfig};
use crate::domain::{FairnessError, Result};
use crate::metrics::METRICS;
use crate::obs;

pub use anova::AnovaResult;
pub use proportions::BayesianResult;

/// What to do after a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    AdoptB,
    KeepA,
    Inconclusive,
}

impl Recommendation {
    /// `AdoptB` when significant and B is higher, `KeepA` when significant
    /// otherwise, `Inconclusive` when not significant.
    pub fn from_outcome(significant: bool, mean_a: f64, mean_b: f64) -> Self {
        match (significant, mean_b > mean_a) {
            (true, true) => Self::AdoptB,
            (true, false) => Self::KeepA,
            (false, _) => Self::Inconclusive,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AdoptB => "adopt_b",
            Self::KeepA => "keep_a",
            Self::Inconclusive => "inconclusive",
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Test that produced an [`ABTestResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMethod {
    WelchT,
    MannWhitney,
    Bootstrap,
    ChiSquare,
}

impl TestMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WelchT => "welch_t",
            Self::MannWhitney => "mann_whitney",
            Self::Bootstrap => "bootstrap",
            Self::ChiSquare => "chi_square",
        }
    }
}

impl std::str::FromStr for TestMethod {
    type Err = FairnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "welch_t" | "t" | "t-test" => Ok(Self::WelchT),
            "mann_whitney" | "mann-whitney" => Ok(Self::MannWhitney),
            "bootstrap" => Ok(Self::Bootstrap),
            "chi_square" | "chi-square" => Ok(Self::ChiSquare),
            other => Err(FairnessError::config(format!("unknown test method: {other}"))),
        }
    }
}

/// Outcome of a two-variant comparison.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ABTestResult {
    pub variant_a_mean: f64,
    pub variant_b_mean: f64,
    /// Always within 0.0–1.0.
    pub p_value: f64,
    /// `p_value < alpha`.
    pub significant: bool,
    pub recommendation: Recommendation,

    pub method: TestMethod,
    /// Test statistic (t, U, mean difference, or chi-square).
    pub statistic: f64,
    /// `variant_b_mean - variant_a_mean`.
    pub difference: f64,
    /// `difference / variant_a_mean * 100`, or 0 when A's mean is 0.
    pub percent_change: f64,
    /// Cohen's d, rank-biserial correlation, or Cramér's V depending on `method`.
    pub effect_size: f64,
    /// Percentile interval of the mean difference (bootstrap only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_interval: Option<[f64; 2]>,
}

/// Configured A/B test suite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbTester {
    alpha: f64,
    power: f64,
}

impl Default for AbTester {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            power: 0.8,
        }
    }
}

impl AbTester {
    /// Build a tester; both `alpha` and `power` must lie in (0, 1).
    pub fn new(alpha: f64, power: f64) -> Result<Self> {
        check_alpha(alpha)?;
        if !(power > 0.0 && power < 1.0) {
            return Err(FairnessError::config(format!(
                "power {power} must be within (0, 1)"
            )));
        }
        Ok(Self { alpha, power })
    }

    /// Tester using the configured significance level and the default power.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(config.alpha, Self::default().power)
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn power(&self) -> f64 {
        self.power
    }

    /// Welch's unequal-variance t-test.
    ///
    /// When both samples have zero variance the test degenerates: equal means
    /// give `p = 1`, different means give `p = 0`. Samples are divided by
    /// their largest magnitude first; t and its degrees of freedom do not
    /// depend on scale, and squared deviations of values near `f64::MAX`
    /// would otherwise overflow.
    pub fn welch_t_test(&self, sample_a: &[f64], sample_b: &[f64]) -> Result<ABTestResult> {
        check_sample("sample_a", sample_a, 2)?;
        check_sample("sample_b", sample_b, 2)?;

        let scale = sample_a
            .iter()
            .chain(sample_b)
            .fold(0.0_f64, |m, v| m.max(v.abs()));
        let scale = if scale > 0.0 { scale } else { 1.0 };
        let a: Vec<f64> = sample_a.iter().map(|v| v / scale).collect();
        let b: Vec<f64> = sample_b.iter().map(|v| v / scale).collect();

        let (na, nb) = (a.len() as f64, b.len() as f64);
        let (mean_a, mean_b) = (mean(&a), mean(&b));
        let (var_a, var_b) = (variance(&a, 1.0), variance(&b, 1.0));

        let se2 = var_a / na + var_b / nb;
        let (statistic, p_value) = if se2 <= 0.0 {
            if mean_a == mean_b {
                (0.0, 1.0)
            } else {
                // Unbounded t; keep it finite so results stay serializable.
                (f64::MAX.copysign(mean_b - mean_a), 0.0)
            }
        } else {
            let t = (mean_b - mean_a) / se2.sqrt();
            let df = se2 * se2
                / ((var_a / na).powi(2) / (na - 1.0) + (var_b / nb).powi(2) / (nb - 1.0));
            if !(t.is_finite() && df.is_finite()) {
                return Err(FairnessError::config(
                    "sample variance is not representable after rescaling",
                ));
            }
            (t, special::student_t_two_sided_p(t, df))
        };

        let pooled = ((variance(&a, 0.0) + variance(&b, 0.0)) / 2.0).sqrt();
        let effect_size = if pooled > 0.0 {
            (mean_b - mean_a) / pooled
        } else {
            0.0
        };

        self.finish(
            TestMethod::WelchT,
            mean_a * scale,
            mean_b * scale,
            statistic,
            p_value,
            effect_size,
            None,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        method: TestMethod,
        mean_a: f64,
        mean_b: f64,
        statistic: f64,
        p_value: f64,
        effect_size: f64,
        confidence_interval: Option<[f64; 2]>,
    ) -> Result<ABTestResult> {
        if p_value.is_nan() {
            return Err(FairnessError::config(format!(
                "{} produced an undefined p-value",
                method.as_str()
            )));
        }
        let p_value = p_value.clamp(0.0, 1.0);
        let significant = p_value < self.alpha;
        let difference = mean_b - mean_a;
        let percent_change = if mean_a != 0.0 {
            difference / mean_a * 100.0
        } else {
            0.0
        };

        METRICS.inc_ab_tests();
        obs::emit_ab_compared(method.as_str(), p_value, significant);

        Ok(ABTestResult {
            variant_a_mean: mean_a,
            variant_b_mean: mean_b,
            p_value,
            significant,
            recommendation: Recommendation::from_outcome(significant, mean_a, mean_b),
            method,
            statistic,
            difference,
            percent_change,
            effect_size,
            confidence_interval,
        })
    }
}

/// Compare two metric samples with Welch's t-test at significance `alpha`.
///
/// # Errors
///
/// - `InsufficientData` if either sample has fewer than two values.
/// - `Configuration` if `alpha` is outside (0, 1) or a sample holds a non-finite value.
pub fn compare(sample_a: &[f64], sample_b: &[f64], alpha: f64) -> Result<ABTestResult> {
    AbTester::new(alpha, AbTester::default().power)?.welch_t_test(sample_a, sample_b)
}

fn check_alpha(alpha: f64) -> Result<()> {
    if alpha > 0.0 && alpha < 1.0 {
        Ok(())
    } else {
        Err(FairnessError::config(format!(
            "alpha {alpha} must be within (0, 1)"
        )))
    }
}

fn check_sample(name: &str, sample: &[f64], min_len: usize) -> Result<()> {
    if sample.len() < min_len {
        return Err(FairnessError::insufficient(format!(
            "{name} has {} values, at least {min_len} required",
            sample.len()
        )));
    }
    if sample.iter().any(|v| !v.is_finite()) {
        return Err(FairnessError::config(format!(
            "{name} contains non-finite values"
        )));
    }
    Ok(())
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Variance with `ddof` delta degrees of freedom.
pub(crate) fn variance(values: &[f64], ddof: f64) -> f64 {
    let n = values.len() as f64;
    if n - ddof <= 0.0 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - ddof)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_constant_samples_inconclusive() {
        let result = compare(&[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0], 0.05).unwrap();
        assert!((result.p_value - 1.0).abs() < 1e-12);
        assert!(!result.significant);
        assert_eq!(result.recommendation, Recommendation::Inconclusive);
    }

    #[test]
    fn test_constant_but_different_samples_adopt_b() {
        let result = compare(&[0.5; 50], &[0.9; 50], 0.05).unwrap();
        assert!(result.significant);
        assert!(result.p_value < 1e-10);
        assert_eq!(result.recommendation, Recommendation::AdoptB);
        assert!((result.percent_change - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_keep_a_when_a_is_better() {
        let a: Vec<f64> = (0..30).map(|i| 0.9 + (i % 3) as f64 * 0.01).collect();
        let b: Vec<f64> = (0..30).map(|i| 0.6 + (i % 3) as f64 * 0.01).collect();
        let result = compare(&a, &b, 0.05).unwrap();
        assert!(result.significant);
        assert_eq!(result.recommendation, Recommendation::KeepA);
        assert!(result.effect_size < 0.0);
    }

    #[test]
    fn test_welch_matches_reference_value() {
        // Equal variances of 2.5: t = 2.0 at df = 8, two-sided p = 0.0805.
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [3.0, 4.0, 5.0, 6.0, 7.0];
        let result = compare(&a, &b, 0.05).unwrap();
        assert!((result.statistic - 2.0).abs() < 1e-12);
        assert!((result.p_value - 0.080_5).abs() < 1e-3);
        assert!(!result.significant);
        assert_eq!(result.recommendation, Recommendation::Inconclusive);
    }

    #[test]
    fn test_too_small_sample() {
        let err = compare(&[1.0], &[1.0, 2.0], 0.05).unwrap_err();
        assert!(matches!(err, FairnessError::InsufficientData(_)));
    }

    #[test]
    fn test_bad_alpha() {
        for alpha in [0.0, 1.0, -0.1] {
            let err = compare(&[1.0, 2.0], &[1.0, 2.0], alpha).unwrap_err();
            assert!(matches!(err, FairnessError::Configuration(_)));
        }
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("bootstrap".parse::<TestMethod>().unwrap(), TestMethod::Bootstrap);
        assert!("anova".parse::<TestMethod>().is_err());
    }

    #[test]
    fn test_result_json_roundtrip() {
        let result = compare(&[0.1, 0.2, 0.3], &[0.2, 0.3, 0.4], 0.05).unwrap();
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"recommendation\":\"inconclusive\""));
        let back: ABTestResult = serde_json::from_str(&json).unwrap();
        assert_eq!(result, back);
    }

    #[test]
    fn test_extreme_magnitudes_keep_p_value_defined() {
        let result = compare(&[1e200, -1e200, 0.0], &[0.0, 1.0, 2.0], 0.05).unwrap();
        assert!((0.0..=1.0).contains(&result.p_value));
        assert!(!result.significant);
        assert!((result.variant_b_mean - 1.0).abs() < 1e-9);
        assert!(result.statistic.is_finite() && result.effect_size.is_finite());

        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("null"));
        let back: ABTestResult = serde_json::from_str(&json).unwrap();
        assert_eq!(result, back);
    }

    #[test]
    fn test_welch_is_scale_invariant() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 3.0, 4.0, 6.0];
        let big = |s: &[f64]| s.iter().map(|v| v * 1e300).collect::<Vec<_>>();
        let small = compare(&a, &b, 0.05).unwrap();
        let large = compare(&big(&a), &big(&b), 0.05).unwrap();
        assert!((small.p_value - large.p_value).abs() < 1e-12);
        assert!((small.statistic - large.statistic).abs() < 1e-9);
    }
}
