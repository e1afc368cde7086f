//! SignalEngine: per-account rolling-window risk signals.
//!
//! Signals are a pure function of (snapshot, account, as-of, window,
//! config). Nothing is cached between calls and a vector is never patched:
//! each evaluation produces a full replacement for its (account, as-of) pair.
//!
//! HIGH-RISK IP: a resolved IP counts as high risk when its score is at
//! or above `high_risk_ip_threshold` (the same test the detector uses).
//!
//! ZERO-ACTIVITY CONVENTION: an account with no logins in the window gets
//! 0 for every rate and count. This is a defined value for "nothing
//! happened", not a missing-data error.
//!
//! COMPOSITE SCORE:
//!
//!   composite = w_fail   * failed_login_rate
//!             + w_new    * new_country_rate
//!             + w_tor    * min(tor_login_count / tor_saturation, 1)
//!             + w_hrisk  * high_risk_ip_share
//!             + w_mfa    * (1 - mfa_rate)            [0 when no logins]
//!             + w_device * min(device_count / device_saturation, 1)
//!
//! Every term lies in [0, 1] and rises with risk, weights are >= 0 and sum
//! to 1, so the composite lies in [0, 1] and never falls when a single
//! risk signal rises.

use crate::{
    config::{EngineConfig, SignalWeights},
    event::LoginEvent,
    snapshot::EventSnapshot,
    types::{AccountId, Timestamp},
    window::EvaluationWindow,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Number of dimensions fed to the clusterer.
pub const FEATURE_COUNT: usize = 6;

/// Names of the clustering features, in `feature_vector()` order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "failed_login_rate",
    "mfa_rate",
    "device_count",
    "new_country_rate",
    "tor_login_count",
    "high_risk_ip_share",
];

/// Weighted contribution of each signal to the composite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalContributions {
    pub failed_login_rate: f64,
    pub new_country_rate: f64,
    pub tor_login_count: f64,
    pub high_risk_ip_share: f64,
    pub mfa_gap: f64,
    pub device_count: f64,
}

impl SignalContributions {
    pub fn total(&self) -> f64 {
        self.failed_login_rate
            + self.new_country_rate
            + self.tor_login_count
            + self.high_risk_ip_share
            + self.mfa_gap
            + self.device_count
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSignalVector {
    pub account_id: AccountId,
    pub as_of: Timestamp,
    pub window_start: Timestamp,
    pub login_count: u32,
    /// Window logins whose IP reputation resolved.
    pub resolved_login_count: u32,
    pub failed_login_rate: f64,
    pub mfa_rate: f64,
    pub device_count: u32,
    pub new_country_rate: f64,
    pub tor_login_count: u32,
    pub high_risk_ip_share: f64,
    pub composite: f64,
    pub contributions: SignalContributions,
}

impl AccountSignalVector {
    /// The zero-activity vector for a window with no logins.
    pub fn zero_activity(account_id: &str, window: &EvaluationWindow) -> Self {
        Self {
            account_id: account_id.to_string(),
            as_of: window.end,
            window_start: window.start,
            login_count: 0,
            resolved_login_count: 0,
            failed_login_rate: 0.0,
            mfa_rate: 0.0,
            device_count: 0,
            new_country_rate: 0.0,
            tor_login_count: 0,
            high_risk_ip_share: 0.0,
            composite: 0.0,
            contributions: SignalContributions::default(),
        }
    }

    /// Raw signal values in `FEATURE_NAMES` order.
    pub fn feature_vector(&self) -> [f64; FEATURE_COUNT] {
        [
            self.failed_login_rate,
            self.mfa_rate,
            f64::from(self.device_count),
            self.new_country_rate,
            f64::from(self.tor_login_count),
            self.high_risk_ip_share,
        ]
    }
}

/// The documented composite formula, separated so it can be audited and
/// re-applied to any vector.
#[derive(Debug, Clone)]
pub struct CompositeScorer {
    weights: SignalWeights,
    tor_saturation: f64,
    device_saturation: f64,
}

impl CompositeScorer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            weights: config.weights.clone(),
            tor_saturation: f64::from(config.tor_saturation),
            device_saturation: f64::from(config.device_saturation),
        }
    }

    pub fn contributions(&self, v: &AccountSignalVector) -> SignalContributions {
        let w = &self.weights;
        let mfa_gap = if v.login_count == 0 {
            0.0
        } else {
            1.0 - v.mfa_rate
        };
        SignalContributions {
            failed_login_rate: w.failed_login_rate * v.failed_login_rate,
            new_country_rate: w.new_country_rate * v.new_country_rate,
            tor_login_count: w.tor_login_count
                * (f64::from(v.tor_login_count) / self.tor_saturation).min(1.0),
            high_risk_ip_share: w.high_risk_ip_share * v.high_risk_ip_share,
            mfa_gap: w.mfa_gap * mfa_gap,
            device_count: w.device_count
                * (f64::from(v.device_count) / self.device_saturation).min(1.0),
        }
    }

    /// Recompute `composite` and `contributions` from the raw fields.
    pub fn apply(&self, mut v: AccountSignalVector) -> AccountSignalVector {
        v.contributions = self.contributions(&v);
        v.composite = v.contributions.total();
        v
    }
}

pub struct SignalEngine {
    window_days: u32,
    high_risk_ip_threshold: f64,
    scorer: CompositeScorer,
}

impl SignalEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            window_days: config.window_days,
            high_risk_ip_threshold: config.high_risk_ip_threshold,
            scorer: CompositeScorer::new(config),
        }
    }

    pub fn scorer(&self) -> &CompositeScorer {
        &self.scorer
    }

    /// Signals for one account over `[as_of - window_days, as_of]`.
    pub fn compute_signals(
        &self,
        snapshot: &EventSnapshot,
        account_id: &str,
        as_of: Timestamp,
        window_days: u32,
    ) -> AccountSignalVector {
        let window = EvaluationWindow::trailing_days(as_of, window_days);
        let logins = snapshot.logins_for(account_id);

        // Logins are sorted by timestamp.
        let lo = logins.partition_point(|l| window.precedes(l.timestamp));
        let hi = logins.partition_point(|l| l.timestamp <= window.end);
        let history = &logins[..lo];
        let in_window = &logins[lo..hi.max(lo)];

        if in_window.is_empty() {
            return AccountSignalVector::zero_activity(account_id, &window);
        }

        let total = in_window.len() as f64;
        let failed = in_window.iter().filter(|l| l.is_failure()).count();
        let mfa = in_window.iter().filter(|l| l.mfa_used).count();
        let devices: HashSet<&str> = in_window
            .iter()
            .filter_map(|l| l.device_id.as_deref())
            .collect();

        let mut resolved = 0u32;
        let mut high_risk = 0u32;
        let mut tor = 0u32;
        for login in in_window {
            if let Some(rep) = snapshot.reputation(&login.ip) {
                resolved += 1;
                if rep.risk_score >= self.high_risk_ip_threshold {
                    high_risk += 1;
                }
                if rep.is_anonymizer {
                    tor += 1;
                }
            }
        }

        let vector = AccountSignalVector {
            account_id: account_id.to_string(),
            as_of: window.end,
            window_start: window.start,
            login_count: in_window.len() as u32,
            resolved_login_count: resolved,
            failed_login_rate: failed as f64 / total,
            mfa_rate: mfa as f64 / total,
            device_count: devices.len() as u32,
            new_country_rate: self.new_country_rate(snapshot, account_id, history, in_window),
            tor_login_count: tor,
            high_risk_ip_share: if resolved == 0 {
                0.0
            } else {
                f64::from(high_risk) / f64::from(resolved)
            },
            composite: 0.0,
            contributions: SignalContributions::default(),
        };
        self.scorer.apply(vector)
    }

    /// Batch form over every account in the snapshot, using the configured
    /// window. Accounts are computed in parallel; the result is keyed by id
    /// so completion order never matters.
    pub fn compute_all(
        &self,
        snapshot: &EventSnapshot,
        as_of: Timestamp,
    ) -> BTreeMap<AccountId, AccountSignalVector> {
        let ids: Vec<AccountId> = snapshot.account_ids().into_iter().collect();
        ids.par_iter()
            .map(|id| {
                let v = self.compute_signals(snapshot, id, as_of, self.window_days);
                (id.clone(), v)
            })
            .collect()
    }

    /// Share of distinct window countries absent from the baseline. The
    /// baseline is the account's home countries plus every country seen
    /// strictly before the window start.
    fn new_country_rate(
        &self,
        snapshot: &EventSnapshot,
        account_id: &str,
        history: &[LoginEvent],
        in_window: &[LoginEvent],
    ) -> f64 {
        let window_countries: BTreeSet<&str> = in_window
            .iter()
            .filter_map(|l| l.country.as_deref())
            .collect();
        if window_countries.is_empty() {
            return 0.0;
        }

        let mut baseline: BTreeSet<&str> = history
            .iter()
            .filter_map(|l| l.country.as_deref())
            .collect();
        if let Some(account) = snapshot.account(account_id) {
            baseline.extend(account.home_countries.iter().map(String::as_str));
        }

        let new = window_countries
            .iter()
            .filter(|c| !baseline.contains(*c))
            .count();
        new as f64 / window_countries.len() as f64
    }
}
