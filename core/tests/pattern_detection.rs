//! Risky-login-then-provisioning-burst detection tests.

mod common;

use common::*;
use cloudrisk_core::{
    config::EngineConfig,
    pattern::{severity_score, PatternDetector, SeverityLevel, TriggerReason},
    snapshot::{EventSnapshot, SnapshotBuilder},
};

fn with_reputations() -> SnapshotBuilder {
    standard_reputations()
        .into_iter()
        .fold(EventSnapshot::builder(), SnapshotBuilder::ip_reputation)
}

fn detector() -> PatternDetector {
    PatternDetector::new(&EngineConfig::default())
}

/// Four provisioning actions across three regions within two hours.
fn three_region_burst(account: &str) -> Vec<cloudrisk_core::event::ComputeActivityEvent> {
    vec![
        provision("c1", account, at_hours(-9), "us-east-1"),
        provision("c2", account, at_hours(-8), "eu-west-1"),
        provision("c3", account, at_hours(-8), "ap-southeast-1"),
        provision("c4", account, at_hours(-8), "us-east-1"),
    ]
}

#[test]
fn tor_failure_then_three_region_burst_yields_one_detection() {
    let snapshot = with_reputations()
        .login(login("l1", "acct-a", at_hours(-10)).ip(TOR_IP).failed().build())
        .extend_compute(three_region_burst("acct-a"))
        .build();
    let events = detector().scan(&snapshot, t0());

    assert_eq!(events.len(), 1);
    let d = &events[0];
    assert_eq!(d.account_id, "acct-a");
    assert_eq!(d.region_count, 3);
    assert_eq!(d.action_count, 4);
    assert_eq!(d.trigger_reason, TriggerReason::Anonymizer);
    assert_eq!(d.trigger.login_id, "l1");
    assert_eq!(d.regions, vec!["ap-southeast-1", "eu-west-1", "us-east-1"]);
}

#[test]
fn single_region_burst_is_not_a_detection() {
    let burst = (0..4).map(|i| provision(&format!("c{i}"), "acct-a", at_hours(-9), "us-east-1"));
    let snapshot = with_reputations()
        .login(login("l1", "acct-a", at_hours(-10)).ip(TOR_IP).failed().build())
        .extend_compute(burst)
        .build();
    assert!(detector().scan(&snapshot, t0()).is_empty());
}

#[test]
fn successful_login_never_triggers() {
    let snapshot = with_reputations()
        .login(login("l1", "acct-a", at_hours(-10)).ip(TOR_IP).build())
        .extend_compute(three_region_burst("acct-a"))
        .build();
    assert!(detector().scan(&snapshot, t0()).is_empty());
}

#[test]
fn unresolved_or_clean_ip_never_triggers() {
    let snapshot = with_reputations()
        .login(login("l1", "acct-a", at_hours(-10)).ip(UNKNOWN_IP).failed().build())
        .login(login("l2", "acct-a", at_hours(-10)).ip(CLEAN_IP).failed().build())
        .extend_compute(three_region_burst("acct-a"))
        .build();
    assert!(detector().scan(&snapshot, t0()).is_empty());
}

#[test]
fn high_risk_ip_triggers_without_anonymizer() {
    let snapshot = with_reputations()
        .login(login("l1", "acct-a", at_hours(-10)).ip(RISKY_IP).failed().build())
        .extend_compute(three_region_burst("acct-a"))
        .build();
    let events = detector().scan(&snapshot, t0());
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].trigger_reason, TriggerReason::HighRiskIp);
    assert_eq!(events[0].trigger_ip_risk, 0.9);
}

#[test]
fn actions_before_trigger_or_after_window_are_ignored() {
    let snapshot = with_reputations()
        .login(login("l1", "acct-a", at_hours(-30)).ip(TOR_IP).failed().build())
        .extend_compute(vec![
            provision("c0", "acct-a", at_hours(-31), "sa-east-1"),
            provision("c1", "acct-a", at_hours(-29), "us-east-1"),
            provision("c2", "acct-a", at_hours(-28), "eu-west-1"),
            // 25 hours after the trigger: outside the 24h burst window.
            provision("c3", "acct-a", at_hours(-5), "ap-southeast-1"),
        ])
        .build();
    assert!(detector().scan(&snapshot, t0()).is_empty());
}

#[test]
fn terminations_do_not_count_toward_burst() {
    let snapshot = with_reputations()
        .login(login("l1", "acct-a", at_hours(-10)).ip(TOR_IP).failed().build())
        .extend_compute(vec![
            provision("c1", "acct-a", at_hours(-9), "us-east-1"),
            provision("c2", "acct-a", at_hours(-9), "eu-west-1"),
            terminate("c3", "acct-a", at_hours(-9), "ap-southeast-1"),
        ])
        .build();
    assert!(detector().scan(&snapshot, t0()).is_empty());
}

#[test]
fn overlapping_triggers_each_produce_a_detection() {
    let snapshot = with_reputations()
        .login(login("l1", "acct-a", at_hours(-11)).ip(TOR_IP).failed().build())
        .login(login("l2", "acct-a", at_hours(-10)).ip(RISKY_IP).failed().build())
        .extend_compute(three_region_burst("acct-a"))
        .build();
    let events = detector().scan(&snapshot, t0());

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].trigger.login_id, "l1");
    assert_eq!(events[1].trigger.login_id, "l2");
    assert_ne!(events[0].detection_id, events[1].detection_id);
}

#[test]
fn burst_window_is_capped_at_as_of() {
    let snapshot = with_reputations()
        .login(login("l1", "acct-a", at_hours(-2)).ip(TOR_IP).failed().build())
        .extend_compute(vec![
            provision("c1", "acct-a", at_hours(-1), "us-east-1"),
            provision("c2", "acct-a", at_hours(-1), "eu-west-1"),
            // After as-of: not yet observable.
            provision("c3", "acct-a", at_hours(1), "ap-southeast-1"),
        ])
        .build();
    assert!(detector().scan(&snapshot, t0()).is_empty());

    let later = detector().scan(&snapshot, at_hours(2));
    assert_eq!(later.len(), 1);
    assert_eq!(later[0].burst_end, at_hours(2));
}

#[test]
fn severity_rises_with_regions_and_actions() {
    assert!(severity_score(3, 4) < severity_score(4, 4));
    assert!(severity_score(3, 4) < severity_score(3, 5));
    assert_eq!(severity_score(10, 10), 1.0);
    assert_eq!(SeverityLevel::from_score(severity_score(1, 2)), SeverityLevel::Low);
    assert_eq!(SeverityLevel::from_score(severity_score(2, 3)), SeverityLevel::Medium);
    assert_eq!(SeverityLevel::from_score(severity_score(3, 4)), SeverityLevel::High);
    assert_eq!(SeverityLevel::from_score(1.0), SeverityLevel::Critical);
}

#[test]
fn scan_output_is_ordered_by_account() {
    let snapshot = with_reputations()
        .login(login("lb", "acct-b", at_hours(-10)).ip(TOR_IP).failed().build())
        .login(login("la", "acct-a", at_hours(-10)).ip(TOR_IP).failed().build())
        .extend_compute(three_region_burst("acct-b"))
        .extend_compute(
            three_region_burst("acct-a")
                .into_iter()
                .map(|mut e| {
                    e.event_id = format!("{}-a", e.event_id);
                    e
                }),
        )
        .build();
    let events = detector().scan(&snapshot, t0());
    let accounts: Vec<&str> = events.iter().map(|d| d.account_id.as_str()).collect();
    assert_eq!(accounts, vec!["acct-a", "acct-b"]);
}
