//! Anomaly clustering tests.

mod common;

use common::*;
use cloudrisk_core::{
    cluster::{AnomalyClusterer, ClusterLabel},
    config::EngineConfig,
    error::RiskError,
    signal::{AccountSignalVector, SignalEngine},
    window::EvaluationWindow,
};
use chrono::Duration;
use std::collections::BTreeMap;

/// Twenty ordinary accounts with small variations plus one extreme account.
fn population() -> BTreeMap<String, AccountSignalVector> {
    let scorer = SignalEngine::new(&EngineConfig::default());
    let window = EvaluationWindow::trailing(t0(), Duration::days(14));
    let mut vectors = BTreeMap::new();
    for i in 0..20 {
        let id = format!("acct-{i:02}");
        let mut v = AccountSignalVector::zero_activity(&id, &window);
        v.login_count = 10;
        v.resolved_login_count = 10;
        v.failed_login_rate = 0.05 * f64::from(i % 3);
        v.mfa_rate = 0.8 + 0.05 * f64::from(i % 4);
        v.device_count = 1 + (i % 2);
        vectors.insert(id, scorer.scorer().apply(v));
    }
    let mut odd = AccountSignalVector::zero_activity("acct-zz", &window);
    odd.login_count = 6;
    odd.resolved_login_count = 6;
    odd.failed_login_rate = 1.0;
    odd.device_count = 6;
    odd.new_country_rate = 1.0;
    odd.tor_login_count = 6;
    odd.high_risk_ip_share = 1.0;
    vectors.insert("acct-zz".into(), scorer.scorer().apply(odd));
    vectors
}

/// One centroid, so the extreme account cannot capture a cluster of its own.
fn single_cluster() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.clustering.cluster_count = 1;
    config
}

#[test]
fn same_population_and_seed_give_same_assignments() {
    let clusterer = AnomalyClusterer::new(&EngineConfig::default());
    let a = clusterer.cluster(&population()).unwrap();
    let b = clusterer.cluster(&population()).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.seed, 42);
}

#[test]
fn every_account_is_assigned_exactly_once() {
    let vectors = population();
    let outcome = AnomalyClusterer::new(&EngineConfig::default())
        .cluster(&vectors)
        .unwrap();

    assert_eq!(outcome.assignments.len(), vectors.len());
    for id in vectors.keys() {
        let a = &outcome.assignments[id];
        assert_eq!(&a.account_id, id);
        assert!(a.nearest_cluster < outcome.k);
    }
    let members: usize = outcome.summary.iter().map(|s| s.members).sum();
    assert_eq!(members, vectors.len());
}

#[test]
fn extreme_account_is_labelled_outlier() {
    let outcome = AnomalyClusterer::new(&single_cluster())
        .cluster(&population())
        .unwrap();
    assert_eq!(outcome.assignments["acct-zz"].label, ClusterLabel::Outlier);
    assert!(outcome.outlier_count >= 1);
    assert!(outcome.outliers().any(|id| id == "acct-zz"));
}

#[test]
fn outlier_count_is_bounded_by_percentile() {
    let outcome = AnomalyClusterer::new(&EngineConfig::default())
        .cluster(&population())
        .unwrap();
    // Strictly above the 95th percentile of 21 distances: at most one.
    assert!(outcome.outlier_count <= 1);
}

#[test]
fn empty_population_gives_empty_outcome() {
    let outcome = AnomalyClusterer::new(&EngineConfig::default())
        .cluster(&BTreeMap::new())
        .unwrap();
    assert!(outcome.assignments.is_empty());
    assert_eq!(outcome.outlier_count, 0);
}

#[test]
fn identical_vectors_collapse_to_one_cluster_without_outliers() {
    let window = EvaluationWindow::trailing(t0(), Duration::days(14));
    let vectors: BTreeMap<_, _> = (0..5)
        .map(|i| {
            let id = format!("acct-{i}");
            let v = AccountSignalVector::zero_activity(&id, &window);
            (id, v)
        })
        .collect();
    let outcome = AnomalyClusterer::new(&EngineConfig::default())
        .cluster(&vectors)
        .unwrap();
    assert_eq!(outcome.k, 1);
    assert_eq!(outcome.outlier_count, 0);
}

#[test]
fn non_finite_signal_is_an_error() {
    let mut vectors = population();
    if let Some(v) = vectors.get_mut("acct-00") {
        v.failed_login_rate = f64::NAN;
    }
    let result = AnomalyClusterer::new(&EngineConfig::default()).cluster(&vectors);
    assert!(matches!(result, Err(RiskError::Clustering(_))));
}

#[test]
fn different_seed_still_labels_extreme_account() {
    let mut config = single_cluster();
    config.clustering.seed = 7;
    let outcome = AnomalyClusterer::new(&config).cluster(&population()).unwrap();
    assert_eq!(outcome.seed, 7);
    assert!(outcome.assignments["acct-zz"].label.is_outlier());
}
