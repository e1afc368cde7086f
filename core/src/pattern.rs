//! PatternDetector: risky failed login followed by a multi-region
//! provisioning burst.
//!
//!   1. Trigger: a FAILED login whose IP resolves to risk >= threshold
//!      or to an anonymizing network. Unresolved IPs never trigger.
//!   2. Burst window: provisioning actions of the same account in
//!      [trigger_time, trigger_time + burst_window], capped at as-of.
//!   3. Qualifies when actions >= min_burst_actions AND
//!      distinct regions >= min_burst_regions.
//!   4. One DetectionEvent per qualifying trigger.
//!
//! Overlapping triggers are NOT deduplicated: two failed logins an hour
//! apart that see the same burst each produce their own detection.
//!
//! SEVERITY (monotone in both counts, not learned):
//!
//!   severity_score = min(1, 0.15 * region_count + 0.04 * action_count)
//!
//!   < 0.40 low | < 0.60 medium | < 0.80 high | otherwise critical

use crate::{
    config::EngineConfig,
    event::{ComputeActivityEvent, LoginEvent},
    snapshot::EventSnapshot,
    types::{AccountId, Timestamp},
};
use chrono::Duration;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const REGION_SEVERITY_WEIGHT: f64 = 0.15;
const ACTION_SEVERITY_WEIGHT: f64 = 0.04;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl SeverityLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 0.40 {
            Self::Low
        } else if score < 0.60 {
            Self::Medium
        } else if score < 0.80 {
            Self::High
        } else {
            Self::Critical
        }
    }
}

pub fn severity_score(region_count: usize, action_count: usize) -> f64 {
    (REGION_SEVERITY_WEIGHT * region_count as f64 + ACTION_SEVERITY_WEIGHT * action_count as f64)
        .min(1.0)
}

/// Why a failed login was treated as a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    HighRiskIp,
    Anonymizer,
    HighRiskAnonymizer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub detection_id: String,
    pub account_id: AccountId,
    pub trigger: LoginEvent,
    pub trigger_reason: TriggerReason,
    pub trigger_ip_risk: f64,
    pub burst_end: Timestamp,
    /// Provisioning actions inside the burst window, in time order.
    pub burst: Vec<ComputeActivityEvent>,
    pub action_count: usize,
    pub region_count: usize,
    pub regions: Vec<String>,
    pub severity_score: f64,
    pub severity: SeverityLevel,
}

pub struct PatternDetector {
    high_risk_ip_threshold: f64,
    burst_window: Duration,
    min_actions: usize,
    min_regions: usize,
}

impl PatternDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            high_risk_ip_threshold: config.high_risk_ip_threshold,
            burst_window: config.burst_window(),
            min_actions: config.min_burst_actions,
            min_regions: config.min_burst_regions,
        }
    }

    /// Scan every account. Output is ordered by account id, then trigger
    /// time, then login id; identical inputs give identical output.
    pub fn scan(&self, snapshot: &EventSnapshot, as_of: Timestamp) -> Vec<DetectionEvent> {
        let ids: Vec<AccountId> = snapshot.account_ids().into_iter().collect();
        let per_account: Vec<Vec<DetectionEvent>> = ids
            .par_iter()
            .map(|id| self.scan_account(snapshot, id, as_of))
            .collect();
        per_account.into_iter().flatten().collect()
    }

    pub fn scan_account(
        &self,
        snapshot: &EventSnapshot,
        account_id: &str,
        as_of: Timestamp,
    ) -> Vec<DetectionEvent> {
        let compute = snapshot.compute_for(account_id);
        if compute.is_empty() {
            return Vec::new();
        }

        snapshot
            .logins_for(account_id)
            .iter()
            .take_while(|l| l.timestamp <= as_of)
            .filter_map(|login| {
                let (reason, risk) = self.trigger_reason(snapshot, login)?;
                self.evaluate_burst(login, reason, risk, compute, as_of)
            })
            .collect()
    }

    /// Step 1: is this login a candidate trigger?
    fn trigger_reason(
        &self,
        snapshot: &EventSnapshot,
        login: &LoginEvent,
    ) -> Option<(TriggerReason, f64)> {
        if !login.is_failure() {
            return None;
        }
        let rep = snapshot.reputation(&login.ip)?;
        let high_risk = rep.risk_score >= self.high_risk_ip_threshold;
        let reason = match (high_risk, rep.is_anonymizer) {
            (true, true) => TriggerReason::HighRiskAnonymizer,
            (true, false) => TriggerReason::HighRiskIp,
            (false, true) => TriggerReason::Anonymizer,
            (false, false) => return None,
        };
        Some((reason, rep.risk_score))
    }

    /// Steps 2 to 4 for one trigger.
    fn evaluate_burst(
        &self,
        trigger: &LoginEvent,
        reason: TriggerReason,
        risk: f64,
        compute: &[ComputeActivityEvent],
        as_of: Timestamp,
    ) -> Option<DetectionEvent> {
        let burst_end = trigger
            .timestamp
            .checked_add_signed(self.burst_window)
            .map_or(as_of, |end| end.min(as_of));
        let start = compute.partition_point(|e| e.timestamp < trigger.timestamp);

        let burst: Vec<ComputeActivityEvent> = compute[start..]
            .iter()
            .take_while(|e| e.timestamp <= burst_end)
            .filter(|e| e.is_provisioning())
            .cloned()
            .collect();

        let regions: BTreeSet<&str> = burst.iter().map(|e| e.region.as_str()).collect();
        if burst.len() < self.min_actions || regions.len() < self.min_regions {
            return None;
        }

        let region_count = regions.len();
        let action_count = burst.len();
        let score = severity_score(region_count, action_count);
        let regions: Vec<String> = regions.into_iter().map(str::to_string).collect();

        log::debug!(
            "burst detected: account={} trigger={} actions={} regions={}",
            trigger.account_id,
            trigger.login_id,
            action_count,
            region_count
        );

        Some(DetectionEvent {
            detection_id: format!("det-{}-{}", trigger.account_id, trigger.login_id),
            account_id: trigger.account_id.clone(),
            trigger: trigger.clone(),
            trigger_reason: reason,
            trigger_ip_risk: risk,
            burst_end,
            burst,
            action_count,
            region_count,
            regions,
            severity_score: score,
            severity: SeverityLevel::from_score(score),
        })
    }
}
