//! Collaborator traits consumed by the targeting engine.
//!
//! Survey and trigger configuration is owned by the admin layer and only
//! read here. Device history is the one store the engine writes to, on
//! behalf of the serving layer.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::history::DeviceHistory;
use crate::survey::{AccountId, DeviceId, Survey, SurveyId};
use crate::trigger::Trigger;

/// Errors that can occur during storage operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Survey not found.
    #[error("Survey not found: {0}")]
    SurveyNotFound(SurveyId),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// A lock was poisoned by a panicking writer.
    #[error("Poisoned lock: {0}")]
    PoisonedLock(&'static str),
}

/// Impression timestamps, oldest first, plus the lifetime count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImpressionLog {
    pub timestamps: Vec<DateTime<Utc>>,
    pub lifetime_count: u64,
}

impl ImpressionLog {
    #[must_use]
    pub fn from_history(history: &DeviceHistory) -> Self {
        Self {
            timestamps: history.impressions.clone(),
            lifetime_count: history.impression_count,
        }
    }
}

/// Read access to survey configuration.
pub trait SurveyRepository: Send + Sync {
    /// Returns `StorageError::SurveyNotFound` when the id is unknown.
    fn get_survey(&self, id: SurveyId) -> Result<Survey, StorageError>;
}

/// Read access to the validated triggers of a survey.
pub trait TriggerRepository: Send + Sync {
    /// Triggers attached to `survey_id`; empty when none are configured.
    fn list_triggers(&self, survey_id: SurveyId) -> Result<Vec<Trigger>, StorageError>;
}

/// Submission counts from the analytics pipeline.
pub trait AnalyticsStore: Send + Sync {
    fn submissions_count(&self, survey_id: SurveyId) -> Result<u64, StorageError>;
}

/// Per-device impression, completion, and dismissal history.
///
/// Writes from concurrent requests for one device may race; callers accept
/// approximate frequency-cap counts.
pub trait DeviceHistoryStore: Send + Sync {
    /// History for one (device, survey), or None before the first impression.
    fn get(&self, device: &DeviceId, survey: SurveyId) -> Result<Option<DeviceHistory>, StorageError>;

    /// Impressions of every survey owned by `account` on this device.
    fn account_impressions(&self, device: &DeviceId, account: AccountId) -> Result<ImpressionLog, StorageError>;

    fn record_impression(
        &self,
        device: &DeviceId,
        account: AccountId,
        survey: SurveyId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    fn record_completion(&self, device: &DeviceId, survey: SurveyId, at: DateTime<Utc>) -> Result<(), StorageError>;

    /// Records that the survey was closed without an answer.
    fn record_dismissal(&self, device: &DeviceId, survey: SurveyId, at: DateTime<Utc>) -> Result<(), StorageError>;
}
