//! Proxy precision: how many flagged accounts look truly bad, judged by
//! sparse confirmed-compromise findings and by adverse payment outcomes.
//!
//! Neither label is required for detection; both are imperfect stand-ins
//! for ground truth and are reported side by side.

use crate::{
    snapshot::EventSnapshot,
    stats::PaymentOutcomes,
    types::{AccountId, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyPrecision {
    pub flagged: usize,
    pub confirmed_compromised: usize,
    pub adverse_payment: usize,
    /// confirmed_compromised / flagged.
    pub finding_precision: f64,
    /// adverse_payment / flagged.
    pub payment_precision: f64,
}

/// `None` when nothing is flagged.
pub fn proxy_precision(
    snapshot: &EventSnapshot,
    flagged: &BTreeSet<AccountId>,
    outcomes: &PaymentOutcomes,
    as_of: Timestamp,
) -> Option<ProxyPrecision> {
    if flagged.is_empty() {
        return None;
    }
    let confirmed = flagged
        .iter()
        .filter(|id| {
            snapshot
                .findings_for(id)
                .iter()
                .any(|f| f.confirmed_compromise && f.timestamp <= as_of)
        })
        .count();
    let adverse = flagged
        .iter()
        .filter(|id| outcomes.adverse.contains(*id))
        .count();

    let n = flagged.len() as f64;
    Some(ProxyPrecision {
        flagged: flagged.len(),
        confirmed_compromised: confirmed,
        adverse_payment: adverse,
        finding_precision: confirmed as f64 / n,
        payment_precision: adverse as f64 / n,
    })
}
