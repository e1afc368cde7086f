//! Evaluation window: the trailing interval signals are computed over.

use crate::types::Timestamp;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// `[as_of - length, as_of]`, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl EvaluationWindow {
    /// A window reaching past the earliest representable instant starts there.
    pub fn trailing(as_of: Timestamp, length: Duration) -> Self {
        Self {
            start: as_of
                .checked_sub_signed(length)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            end: as_of,
        }
    }

    /// Trailing window of `days` whole days.
    pub fn trailing_days(as_of: Timestamp, days: u32) -> Self {
        match Duration::try_days(i64::from(days)) {
            Some(length) => Self::trailing(as_of, length),
            None => Self {
                start: DateTime::<Utc>::MIN_UTC,
                end: as_of,
            },
        }
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        self.start <= ts && ts <= self.end
    }

    /// Strictly before the window. History used as a baseline must come
    /// from here so the window never informs its own baseline.
    pub fn precedes(&self, ts: Timestamp) -> bool {
        ts < self.start
    }
}
