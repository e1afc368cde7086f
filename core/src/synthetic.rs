//! Synthetic telemetry generator.
//!
//! Produces a reproducible population of benign accounts plus a share of
//! compromised ones. A compromised account shows the full attack shape:
//! failed logins from a TOR or high-risk IP in a new country, a burst of
//! provisioning across several regions shortly after, worse payment
//! outcomes and (sometimes) a confirmed-compromise finding.
//!
//! RULE: every draw comes from the RngBank, one stream per stage, so the
//! same seed and `SyntheticSpec` always produce the same snapshot.

use crate::{
    event::{
        Account, ComputeAction, ComputeActivityEvent, IpReputation, LoginEvent, LoginOutcome,
        PaymentEvent, PaymentStatus, SecurityFinding,
    },
    rng::{RngBank, StageRng, StageSlot},
    snapshot::{EventSnapshot, SnapshotBuilder},
    types::Timestamp,
};
use chrono::Duration;

const COUNTRIES: [&str; 8] = ["US", "GB", "DE", "FR", "IN", "BR", "JP", "CA"];
const ATTACK_COUNTRIES: [&str; 4] = ["RU", "KP", "NG", "VN"];
const REGIONS: [&str; 6] = [
    "us-east-1",
    "us-west-2",
    "eu-west-1",
    "eu-central-1",
    "ap-southeast-1",
    "sa-east-1",
];

const BENIGN_IPS: usize = 200;
const RISKY_IPS: usize = 20;
const TOR_IPS: usize = 10;
/// Share of benign IPs deliberately left without a reputation record.
const UNRESOLVED_IP_SHARE: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct SyntheticSpec {
    pub accounts: usize,
    pub compromised_share: f64,
    /// Days of history before `end`.
    pub history_days: u32,
    pub end: Timestamp,
}

impl SyntheticSpec {
    pub fn new(accounts: usize, end: Timestamp) -> Self {
        Self {
            accounts,
            compromised_share: 0.05,
            history_days: 60,
            end,
        }
    }
}

struct IpPools {
    benign: Vec<String>,
    risky: Vec<String>,
    tor: Vec<String>,
}

/// Generate a deterministic snapshot.
pub fn generate(seed: u64, spec: &SyntheticSpec) -> EventSnapshot {
    let bank = RngBank::new(seed);
    let mut population = bank.for_stage(StageSlot::Population);
    let mut logins = bank.for_stage(StageSlot::Logins);
    let mut compute = bank.for_stage(StageSlot::Compute);
    let mut payments = bank.for_stage(StageSlot::Payments);

    let (mut builder, pools) = ip_pools(EventSnapshot::builder(), &mut population);
    let start = spec.end - Duration::days(i64::from(spec.history_days));
    let mut compromised = 0usize;

    for i in 0..spec.accounts {
        let account_id = format!("acct-{i:05}");
        let home = *population.pick(&COUNTRIES);
        let home_region = *population.pick(&REGIONS);
        let devices = 1 + population.next_below(2);
        let is_compromised = population.chance(spec.compromised_share);

        builder = builder.account(Account {
            account_id: account_id.clone(),
            created_at: start - Duration::days(30 + population.next_below(300) as i64),
            home_countries: [home.to_string()].into(),
        });

        // Routine activity.
        let mut login_seq = 0usize;
        for day in 0..spec.history_days {
            if !logins.chance(0.6) {
                continue;
            }
            for _ in 0..1 + logins.next_below(3) {
                let ts = start
                    + Duration::days(i64::from(day))
                    + Duration::minutes(logins.next_below(24 * 60) as i64);
                let country = if logins.chance(0.02) {
                    *logins.pick(&COUNTRIES)
                } else {
                    home
                };
                builder = builder.login(LoginEvent {
                    login_id: format!("{account_id}-l{login_seq:05}"),
                    account_id: account_id.clone(),
                    timestamp: ts,
                    outcome: if logins.chance(0.05) {
                        LoginOutcome::Failure
                    } else {
                        LoginOutcome::Success
                    },
                    ip: logins.pick(&pools.benign).clone(),
                    country: Some(country.to_string()),
                    device_id: Some(format!("{account_id}-d{}", logins.next_below(devices))),
                    mfa_used: logins.chance(0.7),
                });
                login_seq += 1;
            }
        }

        let mut compute_seq = 0usize;
        for day in (0..spec.history_days).step_by(3) {
            if !compute.chance(0.5) {
                continue;
            }
            let ts = start
                + Duration::days(i64::from(day))
                + Duration::minutes(compute.next_below(24 * 60) as i64);
            let action = if compute.chance(0.7) {
                ComputeAction::Provision
            } else {
                ComputeAction::Terminate
            };
            builder = builder.compute(ComputeActivityEvent {
                event_id: format!("{account_id}-c{compute_seq:05}"),
                account_id: account_id.clone(),
                timestamp: ts,
                action,
                region: home_region.to_string(),
            });
            compute_seq += 1;
        }

        let mut decline_rate = 0.05;

        if is_compromised {
            compromised += 1;
            decline_rate = 0.5;
            let attack = spec.end - Duration::hours(24 + logins.next_below(24 * 10) as i64);
            let country = *logins.pick(&ATTACK_COUNTRIES);
            let use_tor = logins.chance(0.5);
            for n in 0..2 + logins.next_below(3) {
                let ip = if use_tor {
                    logins.pick(&pools.tor).clone()
                } else {
                    logins.pick(&pools.risky).clone()
                };
                builder = builder.login(LoginEvent {
                    login_id: format!("{account_id}-l{login_seq:05}"),
                    account_id: account_id.clone(),
                    timestamp: attack + Duration::minutes(n as i64 * 3),
                    outcome: LoginOutcome::Failure,
                    ip,
                    country: Some(country.to_string()),
                    device_id: Some(format!("{account_id}-dx")),
                    mfa_used: false,
                });
                login_seq += 1;
            }

            builder = attack_burst(builder, &mut compute, &account_id, attack, compute_seq);

            if population.chance(0.6) {
                builder = builder.finding(SecurityFinding {
                    finding_id: format!("{account_id}-f0"),
                    account_id: account_id.clone(),
                    timestamp: (attack + Duration::hours(12)).min(spec.end),
                    confirmed_compromise: true,
                });
            }
        }

        let mut ts = start + Duration::days(payments.next_below(7) as i64);
        let mut payment_seq = 0usize;
        while ts <= spec.end {
            let status = if payments.chance(decline_rate) {
                if payments.chance(0.3) {
                    PaymentStatus::Chargeback
                } else {
                    PaymentStatus::Declined
                }
            } else {
                PaymentStatus::Succeeded
            };
            builder = builder.payment(PaymentEvent {
                payment_id: format!("{account_id}-p{payment_seq:04}"),
                account_id: account_id.clone(),
                timestamp: ts,
                amount: (payments.range_f64(5.0, 500.0) * 100.0).round() / 100.0,
                status,
            });
            payment_seq += 1;
            ts += Duration::days(7 + payments.next_below(14) as i64);
        }
    }

    log::info!(
        "synthetic batch: seed={} accounts={} compromised={}",
        seed,
        spec.accounts,
        compromised
    );
    builder.build()
}

fn ip_pools(mut builder: SnapshotBuilder, rng: &mut StageRng) -> (SnapshotBuilder, IpPools) {
    let mut pools = IpPools {
        benign: Vec::with_capacity(BENIGN_IPS),
        risky: Vec::with_capacity(RISKY_IPS),
        tor: Vec::with_capacity(TOR_IPS),
    };
    for i in 0..BENIGN_IPS {
        let ip = format!("10.{}.{}.{}", i / 65536, (i / 256) % 256, i % 256);
        if !rng.chance(UNRESOLVED_IP_SHARE) {
            builder = builder.ip_reputation(IpReputation {
                ip: ip.clone(),
                risk_score: rng.range_f64(0.0, 0.4),
                asn: Some(64_512 + (i % 50) as u32),
                is_anonymizer: false,
            });
        }
        pools.benign.push(ip);
    }
    for i in 0..RISKY_IPS {
        let ip = format!("203.0.113.{i}");
        builder = builder.ip_reputation(IpReputation {
            ip: ip.clone(),
            risk_score: rng.range_f64(0.75, 0.99),
            asn: Some(65_000 + i as u32),
            is_anonymizer: false,
        });
        pools.risky.push(ip);
    }
    for i in 0..TOR_IPS {
        let ip = format!("198.51.100.{i}");
        builder = builder.ip_reputation(IpReputation {
            ip: ip.clone(),
            risk_score: rng.range_f64(0.5, 0.95),
            asn: None,
            is_anonymizer: true,
        });
        pools.tor.push(ip);
    }
    (builder, pools)
}

/// Multi-region provisioning burst within a few hours of the attack.
fn attack_burst(
    mut builder: SnapshotBuilder,
    rng: &mut StageRng,
    account_id: &str,
    attack: Timestamp,
    mut seq: usize,
) -> SnapshotBuilder {
    let actions = 4 + rng.next_below(5);
    let region_count = 3 + rng.next_below(3);
    for n in 0..actions {
        builder = builder.compute(ComputeActivityEvent {
            event_id: format!("{account_id}-c{seq:05}"),
            account_id: account_id.to_string(),
            timestamp: attack + Duration::minutes(10 + rng.next_below(6 * 60) as i64),
            action: ComputeAction::Provision,
            region: REGIONS[n % region_count].to_string(),
        });
        seq += 1;
    }
    builder
}
