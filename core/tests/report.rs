//! Report assembly tests.

mod common;

use common::*;
use cloudrisk_core::{
    cluster::AnomalyClusterer,
    config::{EngineConfig, FlagSource},
    pattern::PatternDetector,
    report::{assemble, flagged_accounts, AssemblyInputs, FlagReason},
    signal::SignalEngine,
    snapshot::{EventSnapshot, SnapshotBuilder},
    stats::{GroupOutcome, StatisticalValidator},
};

fn snapshot() -> EventSnapshot {
    standard_reputations()
        .into_iter()
        .fold(EventSnapshot::builder(), SnapshotBuilder::ip_reputation)
        .account(account("acct-a", &["US"]))
        .account(account("acct-b", &["US"]))
        .account(account("acct-c", &["GB"]))
        .login(login("la1", "acct-a", at_hours(-10)).ip(TOR_IP).failed().no_mfa().build())
        .login(login("lb1", "acct-b", at_hours(-10)).build())
        .login(login("lc1", "acct-c", at_hours(-10)).country("GB").build())
        .extend_compute(vec![
            provision("c1", "acct-a", at_hours(-9), "us-east-1"),
            provision("c2", "acct-a", at_hours(-9), "eu-west-1"),
            provision("c3", "acct-a", at_hours(-9), "ap-southeast-1"),
        ])
        .build()
}

#[test]
fn assembly_is_idempotent() {
    let config = EngineConfig::default();
    let snapshot = snapshot();
    let signals = SignalEngine::new(&config).compute_all(&snapshot, t0());
    let detections = PatternDetector::new(&config).scan(&snapshot, t0());
    let clustering = AnomalyClusterer::new(&config).cluster(&signals).unwrap();
    let significance = StatisticalValidator::new(&config)
        .validate(GroupOutcome::new(1, 1), GroupOutcome::new(0, 2))
        .unwrap();
    let flagged = flagged_accounts(&detections, Some(&clustering), FlagSource::Union);

    let inputs = AssemblyInputs {
        signals: &signals,
        detections: &detections,
        clustering: Some(&clustering),
        significance: Some(&significance),
        flagged: &flagged,
        attach_significance: true,
    };
    let first = assemble(&inputs);
    let second = assemble(&inputs);

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn report_carries_detections_and_flag_reason() {
    let config = EngineConfig::default();
    let snapshot = snapshot();
    let signals = SignalEngine::new(&config).compute_all(&snapshot, t0());
    let detections = PatternDetector::new(&config).scan(&snapshot, t0());
    let flagged = flagged_accounts(&detections, None, FlagSource::Detections);

    let reports = assemble(&AssemblyInputs {
        signals: &signals,
        detections: &detections,
        clustering: None,
        significance: None,
        flagged: &flagged,
        attach_significance: true,
    });

    assert_eq!(reports.len(), 3);
    let a = &reports["acct-a"];
    assert_eq!(a.detections.len(), 1);
    assert!(a.flagged);
    assert_eq!(a.flag_reasons, vec![FlagReason::PatternDetection]);

    let b = &reports["acct-b"];
    assert!(b.detections.is_empty());
    assert!(!b.flagged);
    assert!(b.flag_reasons.is_empty());
}

#[test]
fn missing_clustering_leaves_partial_report() {
    let config = EngineConfig::default();
    let snapshot = snapshot();
    let signals = SignalEngine::new(&config).compute_all(&snapshot, t0());
    let detections = PatternDetector::new(&config).scan(&snapshot, t0());
    let flagged = flagged_accounts(&detections, None, FlagSource::Union);

    let reports = assemble(&AssemblyInputs {
        signals: &signals,
        detections: &detections,
        clustering: None,
        significance: None,
        flagged: &flagged,
        attach_significance: true,
    });

    for report in reports.values() {
        assert!(report.cluster.is_none());
        assert!(report.significance.is_none());
    }
    // Rule-based detections still present.
    assert_eq!(reports["acct-a"].detections.len(), 1);
}

#[test]
fn significance_attachment_can_be_disabled() {
    let config = EngineConfig::default();
    let snapshot = snapshot();
    let signals = SignalEngine::new(&config).compute_all(&snapshot, t0());
    let significance = StatisticalValidator::new(&config)
        .validate(GroupOutcome::new(1, 1), GroupOutcome::new(0, 2))
        .unwrap();
    let flagged = Default::default();

    let reports = assemble(&AssemblyInputs {
        signals: &signals,
        detections: &[],
        clustering: None,
        significance: Some(&significance),
        flagged: &flagged,
        attach_significance: false,
    });
    assert!(reports.values().all(|r| r.significance.is_none()));
}

#[test]
fn flag_source_selects_group() {
    let config = EngineConfig::default();
    let snapshot = snapshot();
    let detections = PatternDetector::new(&config).scan(&snapshot, t0());

    let only_detections = flagged_accounts(&detections, None, FlagSource::Detections);
    let only_outliers = flagged_accounts(&detections, None, FlagSource::Outliers);

    assert_eq!(only_detections.len(), 1);
    assert!(only_detections.contains("acct-a"));
    assert!(only_outliers.is_empty());
}
