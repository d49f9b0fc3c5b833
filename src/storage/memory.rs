//! In-memory storage backend.
//!
//! Thread-safe implementations of every collaborator trait, for embedded
//! usage and tests.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};

use crate::error::TargetingResult;
use crate::history::DeviceHistory;
use crate::storage::traits::{
    AnalyticsStore, DeviceHistoryStore, ImpressionLog, StorageError, SurveyRepository, TriggerRepository,
};
use crate::survey::{AccountId, DeviceId, Survey, SurveyId};
use crate::trigger::{Trigger, TriggerRecord};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::PoisonedLock(context)
}

#[derive(Debug, Default)]
struct HistoryState {
    by_device: HashMap<(DeviceId, SurveyId), DeviceHistory>,
    survey_accounts: HashMap<SurveyId, AccountId>,
}

/// Thread-safe in-memory survey, trigger, analytics, and history store.
#[derive(Debug, Default)]
pub struct InMemoryStores {
    surveys: RwLock<HashMap<SurveyId, Survey>>,
    triggers: RwLock<HashMap<SurveyId, Vec<Trigger>>>,
    submissions: RwLock<HashMap<SurveyId, u64>>,
    history: RwLock<HistoryState>,
    impression_retention: Option<Duration>,
}

impl InMemoryStores {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop impression timestamps older than `retention` whenever one is recorded.
    ///
    /// Lifetime counts are unaffected, so only windowed caps shorter than
    /// `retention` stay exact.
    #[must_use]
    pub fn with_impression_retention(mut self, retention: Duration) -> Self {
        self.impression_retention = Some(retention);
        self
    }

    /// Insert or replace a survey.
    pub fn insert_survey(&self, survey: Survey) -> Result<(), StorageError> {
        let mut surveys = self.surveys.write().map_err(|_| lock_err("survey.insert"))?;
        self.history
            .write()
            .map_err(|_| lock_err("survey.insert"))?
            .survey_accounts
            .insert(survey.id, survey.account_id);
        surveys.insert(survey.id, survey);
        Ok(())
    }

    /// Attach a validated trigger to a survey.
    pub fn add_trigger(&self, survey_id: SurveyId, trigger: Trigger) -> Result<(), StorageError> {
        self.triggers
            .write()
            .map_err(|_| lock_err("trigger.add"))?
            .entry(survey_id)
            .or_default()
            .push(trigger);
        Ok(())
    }

    /// Validate persisted rows and replace the survey's trigger set.
    ///
    /// Nothing is stored if any row is invalid.
    ///
    /// # Errors
    ///
    /// Returns `TargetingError::Validation` with the first invalid row's
    /// error, or `TargetingError::Execution` if the store is unavailable.
    pub fn load_trigger_records(
        &self,
        survey_id: SurveyId,
        records: Vec<TriggerRecord>,
        regex_size_limit: usize,
    ) -> TargetingResult<usize> {
        let triggers = records
            .into_iter()
            .map(|record| record.compile(regex_size_limit))
            .collect::<Result<Vec<_>, _>>()?;
        let count = triggers.len();
        self.triggers
            .write()
            .map_err(|_| lock_err("trigger.load"))?
            .insert(survey_id, triggers);
        Ok(count)
    }

    /// Set the submission count reported for a survey.
    pub fn set_submissions(&self, survey_id: SurveyId, count: u64) -> Result<(), StorageError> {
        self.submissions
            .write()
            .map_err(|_| lock_err("submissions.set"))?
            .insert(survey_id, count);
        Ok(())
    }

    /// Count one more submission for a survey.
    pub fn add_submission(&self, survey_id: SurveyId) -> Result<u64, StorageError> {
        let mut submissions = self.submissions.write().map_err(|_| lock_err("submissions.add"))?;
        let count = submissions.entry(survey_id).or_insert(0);
        *count = count.saturating_add(1);
        Ok(*count)
    }

    fn with_history<F>(&self, device: &DeviceId, survey: SurveyId, context: &'static str, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut DeviceHistory),
    {
        let mut state = self.history.write().map_err(|_| lock_err(context))?;
        let history = state.by_device.entry((device.clone(), survey)).or_default();
        f(history);
        Ok(())
    }
}

impl SurveyRepository for InMemoryStores {
    fn get_survey(&self, id: SurveyId) -> Result<Survey, StorageError> {
        let surveys = self.surveys.read().map_err(|_| lock_err("survey.get"))?;
        surveys.get(&id).cloned().ok_or(StorageError::SurveyNotFound(id))
    }
}

impl TriggerRepository for InMemoryStores {
    fn list_triggers(&self, survey_id: SurveyId) -> Result<Vec<Trigger>, StorageError> {
        let triggers = self.triggers.read().map_err(|_| lock_err("trigger.list"))?;
        Ok(triggers.get(&survey_id).cloned().unwrap_or_default())
    }
}

impl AnalyticsStore for InMemoryStores {
    fn submissions_count(&self, survey_id: SurveyId) -> Result<u64, StorageError> {
        let submissions = self.submissions.read().map_err(|_| lock_err("submissions.count"))?;
        Ok(submissions.get(&survey_id).copied().unwrap_or(0))
    }
}

impl DeviceHistoryStore for InMemoryStores {
    fn get(&self, device: &DeviceId, survey: SurveyId) -> Result<Option<DeviceHistory>, StorageError> {
        let state = self.history.read().map_err(|_| lock_err("history.get"))?;
        Ok(state.by_device.get(&(device.clone(), survey)).cloned())
    }

    fn account_impressions(&self, device: &DeviceId, account: AccountId) -> Result<ImpressionLog, StorageError> {
        let state = self.history.read().map_err(|_| lock_err("history.account_impressions"))?;
        let mut log = ImpressionLog::default();
        for ((owner, survey), history) in &state.by_device {
            if owner != device || state.survey_accounts.get(survey) != Some(&account) {
                continue;
            }
            log.timestamps.extend_from_slice(&history.impressions);
            log.lifetime_count = log.lifetime_count.saturating_add(history.impression_count);
        }
        log.timestamps.sort_unstable();
        Ok(log)
    }

    fn record_impression(
        &self,
        device: &DeviceId,
        account: AccountId,
        survey: SurveyId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut state = self.history.write().map_err(|_| lock_err("history.record_impression"))?;
        state.survey_accounts.entry(survey).or_insert(account);
        let history = state.by_device.entry((device.clone(), survey)).or_default();
        history.record_impression(at);
        if let Some(cutoff) = self.impression_retention.and_then(|r| at.checked_sub_signed(r)) {
            history.prune_impressions_before(cutoff);
        }
        Ok(())
    }

    fn record_completion(&self, device: &DeviceId, survey: SurveyId, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.with_history(device, survey, "history.record_completion", |h| h.record_completion(at))
    }

    fn record_dismissal(&self, device: &DeviceId, survey: SurveyId, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.with_history(device, survey, "history.record_dismissal", |h| h.record_dismissal(at))
    }
}
