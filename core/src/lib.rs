//! Account-level fraud risk engine for cloud telemetry.
//!
//! Pipeline: EventSnapshot → SignalEngine → {PatternDetector,
//! AnomalyClusterer} → StatisticalValidator → RiskReport.
//! See `engine.rs` for the execution order and its rules.

pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod pattern;
pub mod precision;
pub mod report;
pub mod rng;
pub mod signal;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod synthetic;
pub mod timeline;
pub mod types;
pub mod window;
