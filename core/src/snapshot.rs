//! Immutable telemetry snapshot for one evaluation run.
//!
//! A snapshot is built once (from the SQLite store, the synthetic
//! generator, or test fixtures) and shared read-only by every component.
//! Per-account streams are sorted by (timestamp, record id) so that every
//! scan over them is deterministic.

use crate::{
    event::{
        Account, ComputeActivityEvent, IpReputation, LoginEvent, PaymentEvent, SecurityFinding,
    },
    types::{AccountId, Timestamp},
};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
pub struct EventSnapshot {
    accounts: BTreeMap<AccountId, Account>,
    logins: BTreeMap<AccountId, Vec<LoginEvent>>,
    ip_reputation: HashMap<String, IpReputation>,
    compute: BTreeMap<AccountId, Vec<ComputeActivityEvent>>,
    payments: BTreeMap<AccountId, Vec<PaymentEvent>>,
    findings: BTreeMap<AccountId, Vec<SecurityFinding>>,
}

impl EventSnapshot {
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::default()
    }

    /// Every account known to any stream, in id order.
    pub fn account_ids(&self) -> BTreeSet<AccountId> {
        self.accounts
            .keys()
            .chain(self.logins.keys())
            .chain(self.compute.keys())
            .chain(self.payments.keys())
            .chain(self.findings.keys())
            .cloned()
            .collect()
    }

    pub fn account(&self, account_id: &str) -> Option<&Account> {
        self.accounts.get(account_id)
    }

    pub fn logins_for(&self, account_id: &str) -> &[LoginEvent] {
        self.logins.get(account_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn compute_for(&self, account_id: &str) -> &[ComputeActivityEvent] {
        self.compute.get(account_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn payments_for(&self, account_id: &str) -> &[PaymentEvent] {
        self.payments.get(account_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn findings_for(&self, account_id: &str) -> &[SecurityFinding] {
        self.findings.get(account_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Missing reputation means unknown risk, not zero risk.
    pub fn reputation(&self, ip: &str) -> Option<&IpReputation> {
        self.ip_reputation.get(ip)
    }

    /// All logins across accounts, grouped by account id.
    pub fn all_logins(&self) -> impl Iterator<Item = &LoginEvent> {
        self.logins.values().flatten()
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn ip_reputations(&self) -> impl Iterator<Item = &IpReputation> {
        self.ip_reputation.values()
    }

    pub fn all_compute(&self) -> impl Iterator<Item = &ComputeActivityEvent> {
        self.compute.values().flatten()
    }

    pub fn all_payments(&self) -> impl Iterator<Item = &PaymentEvent> {
        self.payments.values().flatten()
    }

    pub fn all_findings(&self) -> impl Iterator<Item = &SecurityFinding> {
        self.findings.values().flatten()
    }

    /// Latest login timestamp. The natural as-of time for a closed batch.
    pub fn latest_login_time(&self) -> Option<Timestamp> {
        self.all_logins().map(|l| l.timestamp).max()
    }

    pub fn login_count(&self) -> usize {
        self.logins.values().map(Vec::len).sum()
    }

    pub fn compute_count(&self) -> usize {
        self.compute.values().map(Vec::len).sum()
    }

    pub fn payment_count(&self) -> usize {
        self.payments.values().map(Vec::len).sum()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

/// Collects records in any order and sorts them on `build()`.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    snapshot: EventSnapshot,
}

impl SnapshotBuilder {
    pub fn account(mut self, account: Account) -> Self {
        self.snapshot
            .accounts
            .insert(account.account_id.clone(), account);
        self
    }

    pub fn login(mut self, login: LoginEvent) -> Self {
        self.snapshot
            .logins
            .entry(login.account_id.clone())
            .or_default()
            .push(login);
        self
    }

    pub fn ip_reputation(mut self, rep: IpReputation) -> Self {
        self.snapshot.ip_reputation.insert(rep.ip.clone(), rep);
        self
    }

    pub fn compute(mut self, event: ComputeActivityEvent) -> Self {
        self.snapshot
            .compute
            .entry(event.account_id.clone())
            .or_default()
            .push(event);
        self
    }

    pub fn payment(mut self, payment: PaymentEvent) -> Self {
        self.snapshot
            .payments
            .entry(payment.account_id.clone())
            .or_default()
            .push(payment);
        self
    }

    pub fn finding(mut self, finding: SecurityFinding) -> Self {
        self.snapshot
            .findings
            .entry(finding.account_id.clone())
            .or_default()
            .push(finding);
        self
    }

    pub fn extend_logins(self, logins: impl IntoIterator<Item = LoginEvent>) -> Self {
        logins.into_iter().fold(self, Self::login)
    }

    pub fn extend_compute(self, events: impl IntoIterator<Item = ComputeActivityEvent>) -> Self {
        events.into_iter().fold(self, Self::compute)
    }

    pub fn extend_payments(self, payments: impl IntoIterator<Item = PaymentEvent>) -> Self {
        payments.into_iter().fold(self, Self::payment)
    }

    pub fn build(mut self) -> EventSnapshot {
        for logins in self.snapshot.logins.values_mut() {
            logins.sort_by(|a, b| (a.timestamp, &a.login_id).cmp(&(b.timestamp, &b.login_id)));
        }
        for events in self.snapshot.compute.values_mut() {
            events.sort_by(|a, b| (a.timestamp, &a.event_id).cmp(&(b.timestamp, &b.event_id)));
        }
        for payments in self.snapshot.payments.values_mut() {
            payments
                .sort_by(|a, b| (a.timestamp, &a.payment_id).cmp(&(b.timestamp, &b.payment_id)));
        }
        for findings in self.snapshot.findings.values_mut() {
            findings
                .sort_by(|a, b| (a.timestamp, &a.finding_id).cmp(&(b.timestamp, &b.finding_id)));
        }
        self.snapshot
    }
}
