//! Telemetry records: the five typed streams supplied by the event store,
//! plus the account reference entity.
//!
//! RULE: Records are immutable once loaded. The engine reads them through
//! an `EventSnapshot` and never writes back.

use crate::types::{AccountId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Account reference entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub created_at: Timestamp,
    /// Countries known for the account at registration. Login-derived
    /// history is added per evaluation window, never from the future.
    pub home_countries: BTreeSet<String>,
}

// ── Logins ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginOutcome {
    Success,
    Failure,
}

impl LoginOutcome {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAIL",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "SUCCESS" => Some(Self::Success),
            "FAIL" => Some(Self::Failure),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginEvent {
    pub login_id: String,
    pub account_id: AccountId,
    pub timestamp: Timestamp,
    pub outcome: LoginOutcome,
    pub ip: String,
    pub country: Option<String>,
    pub device_id: Option<String>,
    pub mfa_used: bool,
}

impl LoginEvent {
    pub fn is_failure(&self) -> bool {
        self.outcome == LoginOutcome::Failure
    }
}

/// Reputation of a single IP. Risk score is in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpReputation {
    pub ip: String,
    pub risk_score: f64,
    pub asn: Option<u32>,
    /// TOR exit, public VPN or other anonymizing network.
    pub is_anonymizer: bool,
}

// ── Compute activity ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeAction {
    Provision,
    Terminate,
    Other(String),
}

impl ComputeAction {
    pub fn as_db_str(&self) -> &str {
        match self {
            Self::Provision => "RUN_INSTANCES",
            Self::Terminate => "TERMINATE_INSTANCES",
            Self::Other(s) => s,
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "RUN_INSTANCES" => Self::Provision,
            "TERMINATE_INSTANCES" => Self::Terminate,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeActivityEvent {
    pub event_id: String,
    pub account_id: AccountId,
    pub timestamp: Timestamp,
    pub action: ComputeAction,
    pub region: String,
}

impl ComputeActivityEvent {
    pub fn is_provisioning(&self) -> bool {
        self.action == ComputeAction::Provision
    }
}

// ── Payments ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Succeeded,
    Declined,
    Chargeback,
}

impl PaymentStatus {
    /// Declines and chargebacks are the adverse outcomes.
    pub fn is_adverse(&self) -> bool {
        matches!(self, Self::Declined | Self::Chargeback)
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "SUCCEEDED",
            Self::Declined => "DECLINED",
            Self::Chargeback => "CHARGEBACK",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "SUCCEEDED" => Some(Self::Succeeded),
            "DECLINED" => Some(Self::Declined),
            "CHARGEBACK" => Some(Self::Chargeback),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub payment_id: String,
    pub account_id: AccountId,
    pub timestamp: Timestamp,
    pub amount: f64,
    pub status: PaymentStatus,
}

/// Sparse ground truth. Only used for proxy precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityFinding {
    pub finding_id: String,
    pub account_id: AccountId,
    pub timestamp: Timestamp,
    pub confirmed_compromise: bool,
}
