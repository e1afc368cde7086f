//! Daily failed-login rate across the whole population.

use crate::snapshot::EventSnapshot;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLoginRate {
    pub day: NaiveDate,
    pub failed: u64,
    pub total: u64,
    pub fail_rate: f64,
}

/// One entry per UTC day that has at least one login, in day order.
pub fn daily_failed_login_rate(snapshot: &EventSnapshot) -> Vec<DailyLoginRate> {
    let mut days: BTreeMap<NaiveDate, (u64, u64)> = BTreeMap::new();
    for login in snapshot.all_logins() {
        let entry = days.entry(login.timestamp.date_naive()).or_default();
        entry.1 += 1;
        if login.is_failure() {
            entry.0 += 1;
        }
    }
    days.into_iter()
        .map(|(day, (failed, total))| DailyLoginRate {
            day,
            failed,
            total,
            fail_rate: failed as f64 / total as f64,
        })
        .collect()
}
