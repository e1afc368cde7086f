//! RiskReport assembly: read-only composition of the component outputs.
//!
//! RULE: Assembly never mutates an upstream artifact. Every field of a
//! report is a clone of what the producing component emitted, so running
//! assembly twice on the same inputs yields an identical mapping.

use crate::{
    cluster::{ClusterAssignment, ClusteringOutcome},
    config::FlagSource,
    pattern::DetectionEvent,
    signal::AccountSignalVector,
    stats::SignificanceOutcome,
    types::AccountId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Whether an optional component produced its artifact for this run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComponentStatus {
    Completed,
    Failed { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagReason {
    PatternDetection,
    ClusterOutlier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub account_id: AccountId,
    pub signals: AccountSignalVector,
    pub detections: Vec<DetectionEvent>,
    /// Absent when clustering failed for the run.
    pub cluster: Option<ClusterAssignment>,
    /// The batch-level result, attached when requested.
    pub significance: Option<SignificanceOutcome>,
    /// Every reason the account stands out, regardless of flag source.
    pub flag_reasons: Vec<FlagReason>,
    /// Member of the flagged group under the configured flag source.
    pub flagged: bool,
}

/// Inputs to assembly, all borrowed from the run.
pub struct AssemblyInputs<'a> {
    pub signals: &'a BTreeMap<AccountId, AccountSignalVector>,
    pub detections: &'a [DetectionEvent],
    pub clustering: Option<&'a ClusteringOutcome>,
    pub significance: Option<&'a SignificanceOutcome>,
    pub flagged: &'a BTreeSet<AccountId>,
    pub attach_significance: bool,
}

/// Accounts forming the flagged group for the given source.
pub fn flagged_accounts(
    detections: &[DetectionEvent],
    clustering: Option<&ClusteringOutcome>,
    source: FlagSource,
) -> BTreeSet<AccountId> {
    let detected = detections.iter().map(|d| d.account_id.clone());
    let outliers = clustering
        .into_iter()
        .flat_map(|c| c.outliers().cloned());
    match source {
        FlagSource::Detections => detected.collect(),
        FlagSource::Outliers => outliers.collect(),
        FlagSource::Union => detected.chain(outliers).collect(),
    }
}

pub fn assemble(inputs: &AssemblyInputs<'_>) -> BTreeMap<AccountId, RiskReport> {
    let mut by_account: BTreeMap<&str, Vec<DetectionEvent>> = BTreeMap::new();
    for d in inputs.detections {
        by_account
            .entry(d.account_id.as_str())
            .or_default()
            .push(d.clone());
    }
    let significance = inputs
        .significance
        .filter(|_| inputs.attach_significance)
        .cloned();

    inputs
        .signals
        .iter()
        .map(|(id, signals)| {
            let detections = by_account.remove(id.as_str()).unwrap_or_default();
            let cluster = inputs
                .clustering
                .and_then(|c| c.assignments.get(id))
                .cloned();

            let mut flag_reasons = Vec::new();
            if !detections.is_empty() {
                flag_reasons.push(FlagReason::PatternDetection);
            }
            if cluster.as_ref().is_some_and(|c| c.label.is_outlier()) {
                flag_reasons.push(FlagReason::ClusterOutlier);
            }

            let report = RiskReport {
                account_id: id.clone(),
                signals: signals.clone(),
                detections,
                cluster,
                significance: significance.clone(),
                flag_reasons,
                flagged: inputs.flagged.contains(id),
            };
            (id.clone(), report)
        })
        .collect()
}
