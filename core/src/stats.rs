//! StatisticalValidator: do flagged accounts fail payments more often?
//!
//! Two disjoint groups, each summarised as (adverse accounts, total
//! accounts), laid out as a 2x2 table:
//!
//! ```text
//!                 adverse   not adverse
//!   flagged          a           b        n1
//!   unflagged        c           d        n2
//! ```
//!
//! METHOD SELECTION:
//!   every expected cell count (row_total * col_total / N) >= min_expected_count
//!     → two-proportion z-test with pooled variance, two-sided
//!   otherwise
//!     → Fisher's exact test, two-sided (sum of tables no more likely than
//!       the observed one); the reported statistic is the observed `a`.
//!
//! An empty group yields `InsufficientData`, never a statistic.

use crate::{
    config::EngineConfig,
    error::{RiskError, RiskResult},
    snapshot::EventSnapshot,
    types::{AccountId, Timestamp},
};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::function::factorial::ln_factorial;
use std::collections::BTreeSet;

/// Relative slack when comparing table probabilities in Fisher's test.
const FISHER_RELATIVE_TOLERANCE: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupOutcome {
    pub adverse: u64,
    pub total: u64,
}

impl GroupOutcome {
    pub fn new(adverse: u64, total: u64) -> Self {
        Self { adverse, total }
    }

    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.adverse as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMethod {
    TwoProportionZ,
    FisherExact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceResult {
    pub flagged_n: u64,
    pub unflagged_n: u64,
    pub flagged_adverse: u64,
    pub unflagged_adverse: u64,
    pub flagged_rate: f64,
    pub unflagged_rate: f64,
    /// flagged_rate - unflagged_rate.
    pub rate_difference: f64,
    /// flagged_rate / unflagged_rate; absent when the baseline rate is 0.
    pub risk_ratio: Option<f64>,
    pub min_expected_cell: f64,
    pub method: TestMethod,
    pub statistic: f64,
    pub p_value: f64,
    pub alpha: f64,
    pub significant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SignificanceOutcome {
    Tested(SignificanceResult),
    InsufficientData {
        flagged_n: u64,
        unflagged_n: u64,
        reason: String,
    },
}

impl SignificanceOutcome {
    pub fn result(&self) -> Option<&SignificanceResult> {
        match self {
            Self::Tested(r) => Some(r),
            Self::InsufficientData { .. } => None,
        }
    }
}

pub struct StatisticalValidator {
    alpha: f64,
    min_expected_count: f64,
}

impl StatisticalValidator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            alpha: config.significance_alpha,
            min_expected_count: config.min_expected_count,
        }
    }

    pub fn validate(
        &self,
        flagged: GroupOutcome,
        unflagged: GroupOutcome,
    ) -> RiskResult<SignificanceOutcome> {
        for (name, g) in [("flagged", flagged), ("unflagged", unflagged)] {
            if g.adverse > g.total {
                return Err(RiskError::Statistics(format!(
                    "{name} group has {} adverse outcomes out of {}",
                    g.adverse, g.total
                )));
            }
        }
        if flagged.total == 0 || unflagged.total == 0 {
            return Ok(SignificanceOutcome::InsufficientData {
                flagged_n: flagged.total,
                unflagged_n: unflagged.total,
                reason: "both groups must contain at least one account".into(),
            });
        }

        let min_expected = min_expected_cell(flagged, unflagged);
        let (method, statistic, p_value) = if min_expected >= self.min_expected_count {
            let (z, p) = two_proportion_z(flagged, unflagged)?;
            (TestMethod::TwoProportionZ, z, p)
        } else {
            let p = fisher_exact_two_sided(flagged, unflagged);
            (TestMethod::FisherExact, flagged.adverse as f64, p)
        };

        let flagged_rate = flagged.rate();
        let unflagged_rate = unflagged.rate();
        let result = SignificanceResult {
            flagged_n: flagged.total,
            unflagged_n: unflagged.total,
            flagged_adverse: flagged.adverse,
            unflagged_adverse: unflagged.adverse,
            flagged_rate,
            unflagged_rate,
            rate_difference: flagged_rate - unflagged_rate,
            risk_ratio: (unflagged_rate > 0.0).then(|| flagged_rate / unflagged_rate),
            min_expected_cell: min_expected,
            method,
            statistic,
            p_value,
            alpha: self.alpha,
            significant: p_value < self.alpha,
        };
        log::info!(
            "validation: method={:?} flagged={}/{} unflagged={}/{} stat={:.4} p={:.6}",
            method,
            flagged.adverse,
            flagged.total,
            unflagged.adverse,
            unflagged.total,
            statistic,
            p_value
        );
        Ok(SignificanceOutcome::Tested(result))
    }
}

fn min_expected_cell(flagged: GroupOutcome, unflagged: GroupOutcome) -> f64 {
    let n = (flagged.total + unflagged.total) as f64;
    let adverse = (flagged.adverse + unflagged.adverse) as f64;
    let fine = n - adverse;
    [flagged.total as f64, unflagged.total as f64]
        .iter()
        .flat_map(|row| [row * adverse / n, row * fine / n])
        .fold(f64::INFINITY, f64::min)
}

/// Pooled two-proportion z-test. Returns (z, two-sided p).
pub fn two_proportion_z(flagged: GroupOutcome, unflagged: GroupOutcome) -> RiskResult<(f64, f64)> {
    let n1 = flagged.total as f64;
    let n2 = unflagged.total as f64;
    let pooled = (flagged.adverse + unflagged.adverse) as f64 / (n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();
    if se <= 0.0 || !se.is_finite() {
        return Ok((0.0, 1.0));
    }
    let z = (flagged.rate() - unflagged.rate()) / se;
    let normal = Normal::new(0.0, 1.0).map_err(|e| RiskError::Statistics(e.to_string()))?;
    let p = (2.0 * normal.cdf(-z.abs())).min(1.0);
    Ok((z, p))
}

fn ln_choose(n: u64, k: u64) -> f64 {
    ln_factorial(n) - ln_factorial(k) - ln_factorial(n - k)
}

/// Two-sided Fisher exact p-value for the 2x2 table.
pub fn fisher_exact_two_sided(flagged: GroupOutcome, unflagged: GroupOutcome) -> f64 {
    let n1 = flagged.total;
    let n2 = unflagged.total;
    let n = n1 + n2;
    let col = flagged.adverse + unflagged.adverse;

    let ln_denominator = ln_choose(n, n1);
    let ln_p = |x: u64| ln_choose(col, x) + ln_choose(n - col, n1 - x) - ln_denominator;

    let lo = col.saturating_sub(n2);
    let hi = n1.min(col);
    let observed = ln_p(flagged.adverse).exp();
    let cutoff = observed * (1.0 + FISHER_RELATIVE_TOLERANCE);

    let p: f64 = (lo..=hi)
        .map(|x| ln_p(x).exp())
        .filter(|px| *px <= cutoff)
        .sum();
    p.min(1.0)
}

/// Payment outcomes per account, up to the evaluation time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentOutcomes {
    /// Accounts with at least one payment.
    pub population: BTreeSet<AccountId>,
    /// Accounts with at least one declined or charged-back payment.
    pub adverse: BTreeSet<AccountId>,
}

impl PaymentOutcomes {
    pub fn collect(snapshot: &EventSnapshot, as_of: Timestamp) -> Self {
        let mut outcomes = Self::default();
        for id in snapshot.account_ids() {
            let mut payments = snapshot
                .payments_for(&id)
                .iter()
                .take_while(|p| p.timestamp <= as_of)
                .peekable();
            if payments.peek().is_none() {
                continue;
            }
            if payments.any(|p| p.status.is_adverse()) {
                outcomes.adverse.insert(id.clone());
            }
            outcomes.population.insert(id);
        }
        outcomes
    }

    /// Split the population into disjoint (flagged, unflagged) groups.
    /// Flagged accounts without payments are not part of either group.
    pub fn partition(&self, flagged: &BTreeSet<AccountId>) -> (GroupOutcome, GroupOutcome) {
        let mut f = GroupOutcome::new(0, 0);
        let mut u = GroupOutcome::new(0, 0);
        for id in &self.population {
            let group = if flagged.contains(id) { &mut f } else { &mut u };
            group.total += 1;
            if self.adverse.contains(id) {
                group.adverse += 1;
            }
        }
        (f, u)
    }
}
