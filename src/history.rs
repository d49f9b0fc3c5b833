//! Per (device, survey) impression and completion history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// History persisted for one device and one survey.
///
/// Created on the first recorded impression and never deleted by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHistory {
    /// Impression timestamps still relevant to windowed caps, oldest first.
    #[serde(default)]
    pub impressions: Vec<DateTime<Utc>>,
    /// Lifetime impression count, unaffected by pruning.
    #[serde(default)]
    pub impression_count: u64,
    pub last_shown_at: Option<DateTime<Utc>>,
    pub last_completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_count: u32,
    /// Set when the survey was closed without an answer.
    pub dismissed_at: Option<DateTime<Utc>>,
}

impl DeviceHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_impression(&mut self, at: DateTime<Utc>) {
        let idx = self.impressions.partition_point(|t| *t <= at);
        self.impressions.insert(idx, at);
        self.impression_count = self.impression_count.saturating_add(1);
        if self.last_shown_at.map_or(true, |last| at > last) {
            self.last_shown_at = Some(at);
        }
    }

    pub fn record_completion(&mut self, at: DateTime<Utc>) {
        self.completion_count = self.completion_count.saturating_add(1);
        if self.last_completed_at.map_or(true, |last| at > last) {
            self.last_completed_at = Some(at);
        }
    }

    pub fn record_dismissal(&mut self, at: DateTime<Utc>) {
        self.dismissed_at = Some(at);
    }

    /// Drops impression timestamps older than `cutoff`; the lifetime count is kept.
    pub fn prune_impressions_before(&mut self, cutoff: DateTime<Utc>) {
        let first = self.impressions.partition_point(|t| *t < cutoff);
        self.impressions.drain(..first);
    }

    #[must_use]
    pub const fn has_completed(&self) -> bool {
        self.completion_count > 0 || self.last_completed_at.is_some()
    }

    /// Closed without answering and never completed afterwards.
    #[must_use]
    pub fn dismissed_without_answer(&self) -> bool {
        match (self.dismissed_at, self.last_completed_at) {
            (Some(dismissed), Some(completed)) => dismissed > completed,
            (Some(_), None) => true,
            _ => false,
        }
    }
}
