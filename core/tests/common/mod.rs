//! Fixture builders shared by the integration tests.
#![allow(dead_code)]

use chrono::{Duration, TimeZone, Utc};
use cloudrisk_core::{
    event::{
        Account, ComputeAction, ComputeActivityEvent, IpReputation, LoginEvent, LoginOutcome,
        PaymentEvent, PaymentStatus, SecurityFinding,
    },
    types::Timestamp,
};

pub const TOR_IP: &str = "198.51.100.7";
pub const RISKY_IP: &str = "203.0.113.9";
pub const CLEAN_IP: &str = "10.0.0.1";
pub const UNKNOWN_IP: &str = "192.0.2.99";

/// Route engine logs to the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Fixed reference instant; tests express everything relative to it.
pub fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn at_hours(h: i64) -> Timestamp {
    t0() + Duration::hours(h)
}

pub fn at_days(d: i64) -> Timestamp {
    t0() + Duration::days(d)
}

pub fn account(id: &str, home: &[&str]) -> Account {
    Account {
        account_id: id.into(),
        created_at: at_days(-400),
        home_countries: home.iter().map(|c| c.to_string()).collect(),
    }
}

pub struct LoginSpec {
    pub id: String,
    pub account: String,
    pub at: Timestamp,
    pub failed: bool,
    pub ip: String,
    pub country: Option<String>,
    pub device: Option<String>,
    pub mfa: bool,
}

impl LoginSpec {
    pub fn new(id: &str, account: &str, at: Timestamp) -> Self {
        Self {
            id: id.into(),
            account: account.into(),
            at,
            failed: false,
            ip: CLEAN_IP.into(),
            country: Some("US".into()),
            device: Some("dev-1".into()),
            mfa: true,
        }
    }

    pub fn failed(mut self) -> Self {
        self.failed = true;
        self
    }

    pub fn ip(mut self, ip: &str) -> Self {
        self.ip = ip.into();
        self
    }

    pub fn country(mut self, c: &str) -> Self {
        self.country = Some(c.into());
        self
    }

    pub fn device(mut self, d: &str) -> Self {
        self.device = Some(d.into());
        self
    }

    pub fn no_mfa(mut self) -> Self {
        self.mfa = false;
        self
    }

    pub fn build(self) -> LoginEvent {
        LoginEvent {
            login_id: self.id,
            account_id: self.account,
            timestamp: self.at,
            outcome: if self.failed {
                LoginOutcome::Failure
            } else {
                LoginOutcome::Success
            },
            ip: self.ip,
            country: self.country,
            device_id: self.device,
            mfa_used: self.mfa,
        }
    }
}

pub fn login(id: &str, account: &str, at: Timestamp) -> LoginSpec {
    LoginSpec::new(id, account, at)
}

pub fn reputation(ip: &str, risk: f64, tor: bool) -> IpReputation {
    IpReputation {
        ip: ip.into(),
        risk_score: risk,
        asn: Some(64_500),
        is_anonymizer: tor,
    }
}

/// The standard reputation table: TOR, risky, clean. UNKNOWN_IP is absent.
pub fn standard_reputations() -> Vec<IpReputation> {
    vec![
        reputation(TOR_IP, 0.6, true),
        reputation(RISKY_IP, 0.9, false),
        reputation(CLEAN_IP, 0.1, false),
    ]
}

pub fn provision(id: &str, account: &str, at: Timestamp, region: &str) -> ComputeActivityEvent {
    ComputeActivityEvent {
        event_id: id.into(),
        account_id: account.into(),
        timestamp: at,
        action: ComputeAction::Provision,
        region: region.into(),
    }
}

pub fn terminate(id: &str, account: &str, at: Timestamp, region: &str) -> ComputeActivityEvent {
    ComputeActivityEvent {
        action: ComputeAction::Terminate,
        ..provision(id, account, at, region)
    }
}

pub fn payment(id: &str, account: &str, at: Timestamp, status: PaymentStatus) -> PaymentEvent {
    PaymentEvent {
        payment_id: id.into(),
        account_id: account.into(),
        timestamp: at,
        amount: 42.0,
        status,
    }
}

pub fn finding(id: &str, account: &str, at: Timestamp) -> SecurityFinding {
    SecurityFinding {
        finding_id: id.into(),
        account_id: account.into(),
        timestamp: at,
        confirmed_compromise: true,
    }
}
