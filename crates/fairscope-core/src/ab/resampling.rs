//! Distribution-free comparators: Mann-Whitney U and the seeded bootstrap.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{check_sample, mean, special, ABTestResult, AbTester, TestMethod};
use crate::config::BootstrapConfig;
use crate::domain::{FairnessError, Result};

impl AbTester {
    /// Two-sided Mann-Whitney U test using the normal approximation with tie
    /// and continuity correction.
    ///
    /// `statistic` is U for sample A; `effect_size` is the rank-biserial
    /// correlation `1 - 2U / (n_a * n_b)`.
    pub fn mann_whitney(&self, sample_a: &[f64], sample_b: &[f64]) -> Result<ABTestResult> {
        check_sample("sample_a", sample_a, 1)?;
        check_sample("sample_b", sample_b, 1)?;

        let (na, nb) = (sample_a.len(), sample_b.len());
        let mut pooled: Vec<(f64, bool)> = sample_a
            .iter()
            .map(|v| (*v, true))
            .chain(sample_b.iter().map(|v| (*v, false)))
            .collect();
        pooled.sort_by(|x, y| x.0.total_cmp(&y.0));

        // Average ranks over ties and collect the tie-correction term.
        let n = pooled.len();
        let mut rank_sum_a = 0.0;
        let mut tie_term = 0.0;
        let mut i = 0;
        while i < n {
            let mut j = i;
            while j + 1 < n && pooled[j + 1].0 == pooled[i].0 {
                j += 1;
            }
            let avg_rank = (i + j) as f64 / 2.0 + 1.0;
            let ties = (j - i + 1) as f64;
            tie_term += ties.powi(3) - ties;
            rank_sum_a += pooled[i..=j].iter().filter(|(_, a)| *a).count() as f64 * avg_rank;
            i = j + 1;
        }

        let (na_f, nb_f, n_f) = (na as f64, nb as f64, n as f64);
        let u_a = rank_sum_a - na_f * (na_f + 1.0) / 2.0;
        let mu = na_f * nb_f / 2.0;
        let sigma2 = if n > 1 {
            na_f * nb_f / 12.0 * ((n_f + 1.0) - tie_term / (n_f * (n_f - 1.0)))
        } else {
            0.0
        };

        let p_value = if sigma2 <= 0.0 {
            1.0
        } else {
            let z = ((u_a - mu).abs() - 0.5) / sigma2.sqrt();
            if z <= 0.0 {
                1.0
            } else {
                special::normal_two_sided_p(z)
            }
        };
        let effect_size = 1.0 - 2.0 * u_a / (na_f * nb_f);

        self.finish(
            TestMethod::MannWhitney,
            mean(sample_a),
            mean(sample_b),
            u_a,
            p_value,
            effect_size,
            None,
        )
    }

    /// Bootstrap test of the mean difference `mean(B) - mean(A)`.
    ///
    /// Both samples are resampled with replacement `config.iterations` times
    /// from an RNG seeded with `config.seed`, so identical inputs always give
    /// identical results. The p-value is twice the smaller tail share of
    /// resampled differences on either side of zero; the interval is the
    /// `alpha/2`..`1-alpha/2` percentile range.
    pub fn bootstrap(
        &self,
        sample_a: &[f64],
        sample_b: &[f64],
        config: &BootstrapConfig,
    ) -> Result<ABTestResult> {
        check_sample("sample_a", sample_a, 2)?;
        check_sample("sample_b", sample_b, 2)?;
        if config.iterations == 0 {
            return Err(FairnessError::config(
                "bootstrap.iterations must be positive",
            ));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut diffs: Vec<f64> = (0..config.iterations)
            .map(|_| resampled_mean(&mut rng, sample_b) - resampled_mean(&mut rng, sample_a))
            .collect();
        diffs.sort_by(f64::total_cmp);

        let iterations = diffs.len() as f64;
        let at_or_below = diffs.iter().filter(|d| **d <= 0.0).count() as f64 / iterations;
        let at_or_above = diffs.iter().filter(|d| **d >= 0.0).count() as f64 / iterations;
        let p_value = (2.0 * at_or_below.min(at_or_above)).min(1.0);

        let lower = percentile(&diffs, self.alpha / 2.0);
        let upper = percentile(&diffs, 1.0 - self.alpha / 2.0);

        let (mean_a, mean_b) = (mean(sample_a), mean(sample_b));
        let spread = super::variance(&diffs, 1.0).sqrt();
        let effect_size = if spread > 0.0 {
            (mean_b - mean_a) / spread
        } else {
            0.0
        };

        self.finish(
            TestMethod::Bootstrap,
            mean_a,
            mean_b,
            mean_b - mean_a,
            p_value,
            effect_size,
            Some([lower, upper]),
        )
    }
}

fn resampled_mean(rng: &mut StdRng, sample: &[f64]) -> f64 {
    let n = sample.len();
    (0..n).map(|_| sample[rng.gen_range(0..n)]).sum::<f64>() / n as f64
}

/// Nearest-rank percentile of an already sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
