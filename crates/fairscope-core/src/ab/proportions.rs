//! Count-based comparisons: chi-square contingency, sample sizing, and the
//! Beta-Binomial Bayesian test.

use serde::{Deserialize, Serialize};

use super::{check_alpha, special, ABTestResult, AbTester, Recommendation, TestMethod};
use crate::domain::{FairnessError, Result};

/// P(B > A) above which the Bayesian test recommends B.
const BAYES_ADOPT: f64 = 0.95;
/// P(B > A) below which the Bayesian test recommends A.
const BAYES_KEEP: f64 = 0.05;

/// Posterior summary of a Beta-Binomial A/B test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BayesianResult {
    pub prob_b_better: f64,
    pub prob_a_better: f64,
    /// Posterior means of the two success rates.
    pub posterior_mean_a: f64,
    pub posterior_mean_b: f64,
    /// Central 95% credible intervals.
    pub credible_interval_a: [f64; 2],
    pub credible_interval_b: [f64; 2],
    /// Expected rate given up by choosing A, `E[max(p_b - p_a, 0)]`.
    pub expected_loss_choosing_a: f64,
    /// Expected rate given up by choosing B, `E[max(p_a - p_b, 0)]`.
    pub expected_loss_choosing_b: f64,
    pub recommendation: Recommendation,
}

impl AbTester {
    /// Chi-square test of independence over a 2×k table of category counts.
    ///
    /// Categories empty in both rows are dropped. Yates' correction applies
    /// when one degree of freedom remains. Variant means are each row's share
    /// of the first category; `effect_size` is Cramér's V.
    pub fn chi_square(&self, counts_a: &[u64], counts_b: &[u64]) -> Result<ABTestResult> {
        if counts_a.len() != counts_b.len() {
            return Err(FairnessError::config(format!(
                "count rows differ in length: {} vs {}",
                counts_a.len(),
                counts_b.len()
            )));
        }
        let columns: Vec<(f64, f64)> = counts_a
            .iter()
            .zip(counts_b)
            .filter(|(a, b)| **a + **b > 0)
            .map(|(a, b)| (*a as f64, *b as f64))
            .collect();
        if columns.len() < 2 {
            return Err(FairnessError::insufficient(
                "chi-square needs at least two non-empty categories",
            ));
        }

        let row_a: f64 = columns.iter().map(|(a, _)| a).sum();
        let row_b: f64 = columns.iter().map(|(_, b)| b).sum();
        if row_a == 0.0 || row_b == 0.0 {
            return Err(FairnessError::insufficient(
                "both variants need at least one observation",
            ));
        }
        let total = row_a + row_b;
        let dof = (columns.len() - 1) as f64;
        let yates = columns.len() == 2;

        let chi2: f64 = columns
            .iter()
            .flat_map(|(a, b)| {
                let col = a + b;
                [(*a, row_a * col / total), (*b, row_b * col / total)]
            })
            .map(|(observed, expected)| {
                let mut diff = (observed - expected).abs();
                if yates {
                    diff = (diff - 0.5).max(0.0);
                }
                diff * diff / expected
            })
            .sum();

        let p_value = special::chi_square_survival(chi2, dof);
        let effect_size = (chi2 / total).sqrt();
        let share_a = counts_a.first().copied().unwrap_or(0) as f64 / row_a;
        let share_b = counts_b.first().copied().unwrap_or(0) as f64 / row_b;

        self.finish(
            TestMethod::ChiSquare,
            share_a,
            share_b,
            chi2,
            p_value,
            effect_size,
            None,
        )
    }

    /// Per-variant sample size needed to detect a relative lift of
    /// `min_detectable_effect` over `baseline_rate` (two-proportion z test).
    pub fn required_sample_size(
        &self,
        baseline_rate: f64,
        min_detectable_effect: f64,
    ) -> Result<u64> {
        if !(baseline_rate > 0.0 && baseline_rate < 1.0) {
            return Err(FairnessError::config(format!(
                "baseline_rate {baseline_rate} must be within (0, 1)"
            )));
        }
        if !(min_detectable_effect.is_finite() && min_detectable_effect != 0.0) {
            return Err(FairnessError::config(
                "min_detectable_effect must be a non-zero finite value",
            ));
        }
        let p1 = baseline_rate;
        let p2 = baseline_rate * (1.0 + min_detectable_effect);
        if !(p2 > 0.0 && p2 < 1.0) {
            return Err(FairnessError::config(format!(
                "target rate {p2} must be within (0, 1)"
            )));
        }
        check_alpha(self.alpha)?;

        let z_alpha = special::normal_ppf(1.0 - self.alpha / 2.0);
        let z_beta = special::normal_ppf(self.power);
        let pooled = (p1 + p2) / 2.0;
        let numerator = (z_alpha * (2.0 * pooled * (1.0 - pooled)).sqrt()
            + z_beta * (p1 * (1.0 - p1) + p2 * (1.0 - p2)).sqrt())
        .powi(2);
        let n = (numerator / (p2 - p1).powi(2)).ceil();
        Ok(n as u64)
    }

    /// Bayesian comparison of two success rates under Beta(prior_alpha, prior_beta) priors.
    ///
    /// P(B > A) and the expected losses are exact while some posterior
    /// parameter is at most [`BAYES_EXACT_LIMIT`]; beyond that both use the
    /// normal approximation of the rate difference, so cost stays bounded
    /// for any trial count.
    pub fn bayesian(
        &self,
        successes_a: u64,
        trials_a: u64,
        successes_b: u64,
        trials_b: u64,
        prior: (u64, u64),
    ) -> Result<BayesianResult> {
        let (prior_alpha, prior_beta) = prior;
        if prior_alpha == 0 || prior_beta == 0 {
            return Err(FairnessError::config("prior parameters must be positive"));
        }
        let variants = [("a", successes_a, trials_a), ("b", successes_b, trials_b)];
        for (name, successes, trials) in variants {
            if successes > trials {
                return Err(FairnessError::config(format!(
                    "variant {name}: {successes} successes exceed {trials} trials"
                )));
            }
        }

        let posterior = |successes: u64, trials: u64| -> Result<BetaPosterior> {
            let alpha = prior_alpha.checked_add(successes);
            let beta = prior_beta.checked_add(trials - successes);
            match (alpha, beta) {
                (Some(alpha), Some(beta)) if alpha.checked_add(beta).is_some() => {
                    Ok(BetaPosterior { alpha, beta })
                }
                _ => Err(FairnessError::config("posterior parameters overflow u64")),
            }
        };
        let a = posterior(successes_a, trials_a)?;
        let b = posterior(successes_b, trials_b)?;

        let prob_b_better = prob_greater(a, b).clamp(0.0, 1.0);
        let recommendation = if prob_b_better > BAYES_ADOPT {
            Recommendation::AdoptB
        } else if prob_b_better < BAYES_KEEP {
            Recommendation::KeepA
        } else {
            Recommendation::Inconclusive
        };
        let expected_loss_choosing_a = expected_loss(a, b);
        let expected_loss_choosing_b =
            (expected_loss_choosing_a - (b.mean() - a.mean())).max(0.0);

        Ok(BayesianResult {
            prob_b_better,
            prob_a_better: 1.0 - prob_b_better,
            expected_loss_choosing_a,
            expected_loss_choosing_b,
            posterior_mean_a: a.mean(),
            posterior_mean_b: b.mean(),
            credible_interval_a: a.credible_interval(),
            credible_interval_b: b.credible_interval(),
            recommendation,
        })
    }
}

/// Largest posterior parameter count for which exact sums are used.
pub const BAYES_EXACT_LIMIT: u64 = 10_000;

/// Beta posterior with integer parameters.
#[derive(Debug, Clone, Copy)]
struct BetaPosterior {
    alpha: u64,
    beta: u64,
}

impl BetaPosterior {
    fn mean(self) -> f64 {
        self.alpha as f64 / (self.alpha as f64 + self.beta as f64)
    }

    fn variance(self) -> f64 {
        let (a, b) = (self.alpha as f64, self.beta as f64);
        a * b / ((a + b).powi(2) * (a + b + 1.0))
    }

    /// Beta(alpha + 1, beta); weights the density by `x`.
    fn shifted(self) -> Self {
        Self {
            alpha: self.alpha + 1,
            beta: self.beta,
        }
    }

    /// Distribution of `1 - X`.
    fn mirrored(self) -> Self {
        Self {
            alpha: self.beta,
            beta: self.alpha,
        }
    }

    fn credible_interval(self) -> [f64; 2] {
        [self.quantile(0.025), self.quantile(0.975)]
    }

    fn quantile(self, p: f64) -> f64 {
        let (a, b) = (self.alpha as f64, self.beta as f64);
        if self.alpha.max(self.beta) <= BAYES_EXACT_LIMIT {
            special::beta_ppf(p, a, b)
        } else if self.alpha.min(self.beta) > BAYES_EXACT_LIMIT {
            (self.mean() + special::normal_ppf(p) * self.variance().sqrt()).clamp(0.0, 1.0)
        } else if self.alpha < self.beta {
            // Beta(a, b) is close to Gamma(a) / (a + b) when b dominates.
            (special::gamma_ppf(p, a) / (a + b)).clamp(0.0, 1.0)
        } else {
            1.0 - self.mirrored().quantile(1.0 - p)
        }
    }
}

/// Fewest terms any of the four exact forms of P(X_b > X_a) needs.
fn exact_terms(a: BetaPosterior, b: BetaPosterior) -> u64 {
    a.alpha.min(a.beta).min(b.alpha).min(b.beta)
}

/// P(X_b > X_a) for independent Beta posteriors.
fn prob_greater(a: BetaPosterior, b: BetaPosterior) -> f64 {
    // (terms, complement, lower, upper): P(upper > lower), or one minus it.
    let forms = [
        (b.alpha, false, a, b),
        (a.alpha, true, b, a),
        (a.beta, false, b.mirrored(), a.mirrored()),
        (b.beta, true, a.mirrored(), b.mirrored()),
    ];
    let Some(&(terms, complement, lower, upper)) = forms.iter().min_by_key(|f| f.0) else {
        return normal_prob_greater(a, b);
    };
    if terms > BAYES_EXACT_LIMIT {
        return normal_prob_greater(a, b);
    }
    let p = exact_prob_greater(lower, upper);
    if complement {
        1.0 - p
    } else {
        p
    }
}

/// Sum over `upper.alpha` terms; exact for integer parameters.
fn exact_prob_greater(lower: BetaPosterior, upper: BetaPosterior) -> f64 {
    let (aa, ba, bb) = (lower.alpha as f64, lower.beta as f64, upper.beta as f64);
    let base = special::ln_beta(aa, ba);
    (0..upper.alpha)
        .map(|i| {
            let i = i as f64;
            (special::ln_beta(aa + i, ba + bb)
                - (bb + i).ln()
                - special::ln_beta(1.0 + i, bb)
                - base)
                .exp()
        })
        .sum()
}

fn normal_prob_greater(a: BetaPosterior, b: BetaPosterior) -> f64 {
    let sd = (a.variance() + b.variance()).sqrt();
    let diff = b.mean() - a.mean();
    if sd == 0.0 {
        return if diff > 0.0 { 1.0 } else { 0.0 };
    }
    special::normal_cdf(diff / sd)
}

/// E[max(X_b - X_a, 0)]: the rate given up by choosing A.
fn expected_loss(a: BetaPosterior, b: BetaPosterior) -> f64 {
    let loss = if exact_terms(a, b) < BAYES_EXACT_LIMIT {
        // E[X 1(X > Y)] = E[X] * P(X' > Y) with X' ~ Beta(alpha + 1, beta).
        b.mean() * prob_greater(a, b.shifted()) - a.mean() * prob_greater(a.shifted(), b)
    } else {
        let diff = b.mean() - a.mean();
        let sd = (a.variance() + b.variance()).sqrt();
        if sd == 0.0 {
            diff.max(0.0)
        } else {
            let z = diff / sd;
            let density = (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt();
            diff * special::normal_cdf(z) + sd * density
        }
    };
    loss.max(0.0)
}
