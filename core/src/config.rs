//! Engine configuration: every tunable of an evaluation run.
//!
//! RULE: Nothing in the engine reads a threshold that is not on this struct.
//! The defaults below are the documented defaults; the JSON file in
//! `data/engine_config.json` spells out the same values field by field.
//! Out-of-range values are rejected by `validate()`, never clamped.

use crate::error::{ConfigError, RiskError, RiskResult};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Tolerance on the weight normalization (weights must sum to 1.0).
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Which detector output forms the flagged group for significance testing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlagSource {
    /// Accounts with at least one rule-based detection.
    Detections,
    /// Accounts labelled as clustering outliers.
    Outliers,
    /// Either of the above.
    Union,
}

/// Explicit weights of the composite score, one per risk signal.
///
/// The composite is `sum(weight_i * normalized_i)` where every normalized
/// term lies in [0, 1] and rises with risk, so the composite is monotone
/// non-decreasing in each signal and itself lies in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignalWeights {
    pub failed_login_rate: f64,
    pub new_country_rate: f64,
    /// Applied to `min(tor_login_count / tor_saturation, 1)`.
    pub tor_login_count: f64,
    pub high_risk_ip_share: f64,
    /// Applied to `1 - mfa_rate` (only when the window has logins).
    pub mfa_gap: f64,
    /// Applied to `min(device_count / device_saturation, 1)`.
    pub device_count: f64,
}

impl SignalWeights {
    pub fn sum(&self) -> f64 {
        self.failed_login_rate
            + self.new_country_rate
            + self.tor_login_count
            + self.high_risk_ip_share
            + self.mfa_gap
            + self.device_count
    }

    fn named(&self) -> [(&'static str, f64); 6] {
        [
            ("failed_login_rate", self.failed_login_rate),
            ("new_country_rate", self.new_country_rate),
            ("tor_login_count", self.tor_login_count),
            ("high_risk_ip_share", self.high_risk_ip_share),
            ("mfa_gap", self.mfa_gap),
            ("device_count", self.device_count),
        ]
    }
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            failed_login_rate: 0.35,
            new_country_rate: 0.25,
            tor_login_count: 0.15,
            high_risk_ip_share: 0.10,
            mfa_gap: 0.10,
            device_count: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusteringConfig {
    /// Upper bound on k; reduced to the number of distinct vectors.
    pub cluster_count: usize,
    /// Seed for k-means++ initialisation. Logged on every run.
    pub seed: u64,
    /// Independent k-means++ restarts; the lowest-inertia run wins.
    pub restarts: usize,
    pub max_iterations: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            cluster_count: 3,
            seed: 42,
            restarts: 10,
            max_iterations: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Trailing signal window, in days.
    pub window_days: u32,
    /// IP risk score (0 to 1) at or above which an IP counts as high risk.
    pub high_risk_ip_threshold: f64,
    /// Horizon after a trigger login in which provisioning is examined.
    pub burst_window_hours: u32,
    pub min_burst_actions: usize,
    pub min_burst_regions: usize,
    /// Nearest-centroid distances above this percentile are outliers.
    pub outlier_percentile: f64,
    pub significance_alpha: f64,
    /// Minimum expected cell count for the normal-approximation test.
    pub min_expected_count: f64,
    /// TOR login count at which the TOR term of the composite saturates.
    pub tor_saturation: u32,
    /// Distinct device count at which the device term saturates.
    pub device_saturation: u32,
    pub flag_source: FlagSource,
    pub weights: SignalWeights,
    pub clustering: ClusteringConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_days: 14,
            high_risk_ip_threshold: 0.7,
            burst_window_hours: 24,
            min_burst_actions: 3,
            min_burst_regions: 2,
            outlier_percentile: 95.0,
            significance_alpha: 0.05,
            min_expected_count: 5.0,
            tor_saturation: 1,
            device_saturation: 5,
            flag_source: FlagSource::Union,
            weights: SignalWeights::default(),
            clustering: ClusteringConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a JSON config file.
    pub fn load(path: &str) -> RiskResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| RiskError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> RiskResult<Self> {
        let config: EngineConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject every out-of-range value with the field that caused it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=3650).contains(&self.window_days) {
            return Err(out_of_range("window_days", self.window_days, "1..=3650"));
        }
        if !(self.high_risk_ip_threshold > 0.0 && self.high_risk_ip_threshold <= 1.0) {
            return Err(out_of_range(
                "high_risk_ip_threshold",
                self.high_risk_ip_threshold,
                "(0, 1]",
            ));
        }
        if !(1..=720).contains(&self.burst_window_hours) {
            return Err(out_of_range(
                "burst_window_hours",
                self.burst_window_hours,
                "1..=720",
            ));
        }
        if self.min_burst_actions == 0 {
            return Err(out_of_range("min_burst_actions", 0, ">= 1"));
        }
        if self.min_burst_regions == 0 {
            return Err(out_of_range("min_burst_regions", 0, ">= 1"));
        }
        if !(self.outlier_percentile > 0.0 && self.outlier_percentile < 100.0) {
            return Err(out_of_range(
                "outlier_percentile",
                self.outlier_percentile,
                "(0, 100)",
            ));
        }
        if !(self.significance_alpha > 0.0 && self.significance_alpha < 1.0) {
            return Err(out_of_range(
                "significance_alpha",
                self.significance_alpha,
                "(0, 1)",
            ));
        }
        if !(self.min_expected_count.is_finite() && self.min_expected_count > 0.0) {
            return Err(out_of_range(
                "min_expected_count",
                self.min_expected_count,
                "> 0",
            ));
        }
        if self.tor_saturation == 0 {
            return Err(out_of_range("tor_saturation", 0, ">= 1"));
        }
        if self.device_saturation == 0 {
            return Err(out_of_range("device_saturation", 0, ">= 1"));
        }

        for (signal, value) in self.weights.named() {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::NegativeWeight { signal, value });
            }
        }
        let sum = self.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::WeightSum { sum });
        }

        let c = &self.clustering;
        if c.cluster_count == 0 {
            return Err(out_of_range("clustering.cluster_count", 0, ">= 1"));
        }
        if c.restarts == 0 {
            return Err(out_of_range("clustering.restarts", 0, ">= 1"));
        }
        if c.max_iterations == 0 {
            return Err(out_of_range("clustering.max_iterations", 0, ">= 1"));
        }
        Ok(())
    }

    pub fn window(&self) -> Duration {
        Duration::days(i64::from(self.window_days))
    }

    pub fn burst_window(&self) -> Duration {
        Duration::hours(i64::from(self.burst_window_hours))
    }
}

fn out_of_range(field: &'static str, value: impl ToString, expected: &'static str) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        value: value.to_string(),
        expected,
    }
}
