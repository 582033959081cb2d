//! Pipeline configuration.
//!
//! Policy values (pass threshold, significance level, severity cut points)
//! live here rather than in the components that consume them. A config can be
//! loaded from TOML or JSON; every field has a default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{FairnessError, Result};
use crate::ooda::SeverityPolicy;
use crate::validation::ValidationPolicy;

/// Default fairness pass bar.
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// Default A/B significance level.
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Default severity cut points over `1 - overall_fairness`.
pub const DEFAULT_SEVERITY_THRESHOLDS: [f64; 4] = [0.1, 0.25, 0.4, 0.6];

/// Resampling parameters for the bootstrap comparator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BootstrapConfig {
    pub iterations: usize,
    pub seed: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            iterations: 10_000,
            seed: 42,
        }
    }
}

/// Full configuration surface of a fairness audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Demographic columns to analyse.
    pub attributes: Vec<String>,

    /// Fairness pass bar in 0.0–1.0.
    pub threshold: f64,

    /// Significance level for A/B tests, in (0, 1).
    pub alpha: f64,

    /// Four strictly increasing cut points for none/low/medium/high/critical.
    pub severity_thresholds: Vec<f64>,

    pub bootstrap: BootstrapConfig,

    pub validation: ValidationPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            attributes: Vec::new(),
            threshold: DEFAULT_THRESHOLD,
            alpha: DEFAULT_ALPHA,
            severity_thresholds: DEFAULT_SEVERITY_THRESHOLDS.to_vec(),
            bootstrap: BootstrapConfig::default(),
            validation: ValidationPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Config with the given attributes and defaults elsewhere.
    pub fn for_attributes<S: AsRef<str>>(attributes: &[S]) -> Self {
        Self {
            attributes: attributes.iter().map(|a| a.as_ref().to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_severity_thresholds(mut self, cut_points: Vec<f64>) -> Self {
        self.severity_thresholds = cut_points;
        self
    }

    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| FairnessError::config(format!("invalid TOML config: {e}")))
    }

    /// Parse a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| FairnessError::config(format!("invalid JSON config: {e}")))
    }

    /// Load from `path`; `.toml` files are parsed as TOML, everything else as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&raw)?,
            _ => Self::from_json_str(&raw)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Build the severity policy described by `severity_thresholds`.
    pub fn severity_policy(&self) -> Result<SeverityPolicy> {
        SeverityPolicy::from_cut_points(&self.severity_thresholds)
    }

    /// Check every field for range and shape errors.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(FairnessError::config(format!(
                "threshold {} must be within [0, 1]",
                self.threshold
            )));
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(FairnessError::config(format!(
                "alpha {} must be within (0, 1)",
                self.alpha
            )));
        }
        if self.bootstrap.iterations == 0 {
            return Err(FairnessError::config(
                "bootstrap.iterations must be positive",
            ));
        }
        self.severity_policy()?;
        self.validation.validate()?;
        Ok(())
    }
}
