//! Severity banding over `1 - overall_fairness`.

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_SEVERITY_THRESHOLDS;
use crate::domain::{FairnessError, Result, Severity};

/// Four cut points splitting 0.0–1.0 into the five severity bands.
///
/// Each band includes its lower edge: with the defaults, `0.25` is `Medium`
/// and `0.6` is `Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityPolicy {
    cut_points: [f64; 4],
}

impl Default for SeverityPolicy {
    fn default() -> Self {
        Self {
            cut_points: DEFAULT_SEVERITY_THRESHOLDS,
        }
    }
}

impl SeverityPolicy {
    /// Validate and build a policy from exactly four strictly increasing cut points in 0.0–1.0.
    pub fn from_cut_points(cut_points: &[f64]) -> Result<Self> {
        let cut_points: [f64; 4] = cut_points.try_into().map_err(|_| {
            FairnessError::config(format!(
                "severity_thresholds needs exactly 4 cut points, got {}",
                cut_points.len()
            ))
        })?;
        if cut_points
            .iter()
            .any(|c| !c.is_finite() || !(0.0..=1.0).contains(c))
        {
            return Err(FairnessError::config(
                "severity_thresholds must lie within [0, 1]",
            ));
        }
        if cut_points.windows(2).any(|w| w[0] >= w[1]) {
            return Err(FairnessError::config(
                "severity_thresholds must be strictly increasing",
            ));
        }
        Ok(Self { cut_points })
    }

    pub fn cut_points(&self) -> &[f64; 4] {
        &self.cut_points
    }

    /// Lowest unfairness that counts as a finding (the `Low` edge).
    pub fn trigger_level(&self) -> f64 {
        self.cut_points[0]
    }

    /// Map an unfairness value to its band. Non-decreasing in `unfairness`.
    pub fn classify(&self, unfairness: f64) -> Severity {
        let band = self.cut_points.iter().filter(|c| unfairness >= **c).count();
        Severity::ALL[band]
    }
}
