//! The evaluation engine: composes the components over one snapshot.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. SignalEngine batch         (parallel per account)
//!   ── barrier: clustering needs every vector ──
//!   2. PatternDetector scan  ┐
//!   3. AnomalyClusterer      ┘    (run concurrently, independent)
//!   4. StatisticalValidator       (flagged vs unflagged payment outcomes)
//!   5. RiskReport assembly
//!
//! RULES:
//!   - Every stage is a pure function of the snapshot and the config.
//!   - No stage mutates another stage's output.
//!   - All randomness flows through the RngBank (clustering seed).
//!   - Cancellation is whole-run: a cancelled run returns no output.
//!   - A failed clustering or validation run degrades the report (fields
//!     marked absent); rule-based detections are always published.

use crate::{
    cluster::{AnomalyClusterer, ClusterSummary},
    config::EngineConfig,
    error::{RiskError, RiskResult},
    pattern::{DetectionEvent, PatternDetector},
    precision::{proxy_precision, ProxyPrecision},
    report::{assemble, flagged_accounts, AssemblyInputs, ComponentStatus, RiskReport},
    signal::SignalEngine,
    snapshot::EventSnapshot,
    stats::{PaymentOutcomes, SignificanceOutcome, StatisticalValidator},
    timeline::{daily_failed_login_rate, DailyLoginRate},
    types::{AccountId, RunId, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cancellation handle shared between the caller and a running evaluation.
#[derive(Debug, Default)]
pub struct RunControl {
    cancelled: AtomicBool,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn checkpoint(&self, stage: &str) -> RiskResult<()> {
        if self.is_cancelled() {
            log::warn!("run cancelled before {stage}");
            return Err(RiskError::Cancelled);
        }
        Ok(())
    }
}

/// Everything an evaluation run publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub run_id: RunId,
    pub as_of: Timestamp,
    pub config: EngineConfig,
    pub reports: BTreeMap<AccountId, RiskReport>,
    /// Flat list for direct export, ordered by account then trigger time.
    pub detections: Vec<DetectionEvent>,
    pub significance: Option<SignificanceOutcome>,
    pub clustering_status: ComponentStatus,
    pub validation_status: ComponentStatus,
    pub cluster_summary: Vec<ClusterSummary>,
    pub outlier_count: usize,
    pub flagged_count: usize,
    pub proxy_precision: Option<ProxyPrecision>,
    pub timeline: Vec<DailyLoginRate>,
}

pub struct RiskEngine {
    config: EngineConfig,
    attach_significance: bool,
}

impl RiskEngine {
    /// Validates the configuration before anything runs.
    pub fn new(config: EngineConfig) -> RiskResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            attach_significance: true,
        })
    }

    /// Whether each per-account report carries the batch significance result.
    pub fn with_significance_in_reports(mut self, attach: bool) -> Self {
        self.attach_significance = attach;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a full evaluation as of `as_of`.
    pub fn run(
        &self,
        run_id: RunId,
        snapshot: &EventSnapshot,
        as_of: Timestamp,
        control: &RunControl,
    ) -> RiskResult<RunOutput> {
        log::info!(
            "run {run_id}: as_of={as_of} accounts={} logins={} compute={} payments={}",
            snapshot.account_ids().len(),
            snapshot.login_count(),
            snapshot.compute_count(),
            snapshot.payment_count()
        );

        control.checkpoint("signals")?;
        let signals = SignalEngine::new(&self.config).compute_all(snapshot, as_of);
        log::info!("signals: {} vectors", signals.len());

        control.checkpoint("detection")?;
        let detector = PatternDetector::new(&self.config);
        let clusterer = AnomalyClusterer::new(&self.config);
        let (detections, clustering) = rayon::join(
            || detector.scan(snapshot, as_of),
            || clusterer.cluster(&signals),
        );
        log::info!("detections: {}", detections.len());

        let (clustering, clustering_status) = degrade("clustering", clustering);

        control.checkpoint("validation")?;
        let flagged = flagged_accounts(&detections, clustering.as_ref(), self.config.flag_source);
        let outcomes = PaymentOutcomes::collect(snapshot, as_of);
        let (flagged_group, unflagged_group) = outcomes.partition(&flagged);
        let validation =
            StatisticalValidator::new(&self.config).validate(flagged_group, unflagged_group);
        let (significance, validation_status) = degrade("validation", validation);

        control.checkpoint("assembly")?;
        let reports = assemble(&AssemblyInputs {
            signals: &signals,
            detections: &detections,
            clustering: clustering.as_ref(),
            significance: significance.as_ref(),
            flagged: &flagged,
            attach_significance: self.attach_significance,
        });

        let output = RunOutput {
            run_id,
            as_of,
            config: self.config.clone(),
            reports,
            significance,
            clustering_status,
            validation_status,
            cluster_summary: clustering
                .as_ref()
                .map(|c| c.summary.clone())
                .unwrap_or_default(),
            outlier_count: clustering.as_ref().map_or(0, |c| c.outlier_count),
            flagged_count: flagged.len(),
            proxy_precision: proxy_precision(snapshot, &flagged, &outcomes, as_of),
            timeline: daily_failed_login_rate(snapshot),
            detections,
        };

        // Last chance to abort before anything becomes visible.
        control.checkpoint("publish")?;
        log::info!(
            "run {}: {} reports, {} flagged",
            output.run_id,
            output.reports.len(),
            output.flagged_count
        );
        Ok(output)
    }
}

fn degrade<T>(stage: &str, result: RiskResult<T>) -> (Option<T>, ComponentStatus) {
    match result {
        Ok(value) => (Some(value), ComponentStatus::Completed),
        Err(e) => {
            log::warn!("{stage} failed, report marked partial: {e}");
            (
                None,
                ComponentStatus::Failed {
                    reason: e.to_string(),
                },
            )
        }
    }
}

