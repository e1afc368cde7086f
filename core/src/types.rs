//! Shared primitive types used across the entire engine.

use chrono::{DateTime, Utc};

/// A cloud-service customer identity. Keys every telemetry stream.
pub type AccountId = String;

/// Every telemetry timestamp is UTC.
pub type Timestamp = DateTime<Utc>;

/// The canonical evaluation-run identifier.
pub type RunId = String;
