//! Flagged-vs-unflagged payment outcome validation tests.

mod common;

use common::*;
use cloudrisk_core::{
    config::EngineConfig,
    error::RiskError,
    event::PaymentStatus,
    snapshot::EventSnapshot,
    stats::{GroupOutcome, PaymentOutcomes, SignificanceOutcome, StatisticalValidator, TestMethod},
};
use std::collections::BTreeSet;

fn validator() -> StatisticalValidator {
    StatisticalValidator::new(&EngineConfig::default())
}

#[test]
fn large_rate_difference_is_significant_under_z_test() {
    let outcome = validator()
        .validate(GroupOutcome::new(20, 50), GroupOutcome::new(50, 500))
        .unwrap();
    let r = outcome.result().expect("tested");

    assert_eq!(r.method, TestMethod::TwoProportionZ);
    assert_eq!(r.flagged_rate, 0.40);
    assert_eq!(r.unflagged_rate, 0.10);
    assert!((r.rate_difference - 0.30).abs() < 1e-12);
    assert!(r.p_value < 0.05);
    assert!(r.significant);
    assert!(r.statistic > 0.0);
}

#[test]
fn single_account_groups_are_insufficient() {
    let outcome = validator()
        .validate(GroupOutcome::new(1, 1), GroupOutcome::new(0, 0))
        .unwrap();
    match outcome {
        SignificanceOutcome::InsufficientData {
            flagged_n,
            unflagged_n,
            ..
        } => {
            assert_eq!(flagged_n, 1);
            assert_eq!(unflagged_n, 0);
        }
        other => panic!("expected insufficient data, got {other:?}"),
    }
}

#[test]
fn small_expected_counts_switch_to_fisher() {
    let outcome = validator()
        .validate(GroupOutcome::new(3, 4), GroupOutcome::new(1, 4))
        .unwrap();
    let r = outcome.result().expect("tested");
    assert_eq!(r.method, TestMethod::FisherExact);
    assert!(r.min_expected_cell < 5.0);
    assert!((0.0..=1.0).contains(&r.p_value));
    assert!(!r.significant);
}

#[test]
fn equal_rates_are_not_significant() {
    let outcome = validator()
        .validate(GroupOutcome::new(10, 100), GroupOutcome::new(100, 1000))
        .unwrap();
    let r = outcome.result().expect("tested");
    assert!(r.p_value > 0.9);
    assert!(!r.significant);
    assert_eq!(r.risk_ratio, Some(1.0));
}

#[test]
fn zero_baseline_rate_has_no_risk_ratio() {
    let outcome = validator()
        .validate(GroupOutcome::new(5, 10), GroupOutcome::new(0, 200))
        .unwrap();
    assert_eq!(outcome.result().expect("tested").risk_ratio, None);
}

#[test]
fn more_adverse_than_total_is_an_error() {
    let result = validator().validate(GroupOutcome::new(6, 5), GroupOutcome::new(1, 10));
    assert!(matches!(result, Err(RiskError::Statistics(_))));
}

#[test]
fn payment_groups_are_disjoint_and_skip_accounts_without_payments() {
    let snapshot = EventSnapshot::builder()
        .payment(payment("p1", "acct-a", at_days(-3), PaymentStatus::Declined))
        .payment(payment("p2", "acct-b", at_days(-3), PaymentStatus::Succeeded))
        .payment(payment("p3", "acct-c", at_days(-3), PaymentStatus::Chargeback))
        // After as-of: ignored.
        .payment(payment("p4", "acct-b", at_days(2), PaymentStatus::Declined))
        .login(login("l1", "acct-d", at_days(-1)).build())
        .build();
    let outcomes = PaymentOutcomes::collect(&snapshot, t0());
    assert_eq!(outcomes.population.len(), 3);

    let flagged: BTreeSet<String> = ["acct-a".to_string(), "acct-d".to_string()].into();
    let (f, u) = outcomes.partition(&flagged);
    assert_eq!(f, GroupOutcome::new(1, 1));
    assert_eq!(u, GroupOutcome::new(1, 2));
    assert_eq!(f.total + u.total, outcomes.population.len() as u64);
}
