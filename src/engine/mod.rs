//! Targeting engine.
//!
//! `TargetingEngine` answers two questions for a survey and a visitor:
//! whether the survey may render (`decide`) and why or why not
//! (`diagnose`). Both run synchronously against pluggable stores.

mod combinator;
pub mod diagnostics;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::context::{DomProbe, VisitorContext};
use crate::evaluate::{evaluate, EvaluationResult};
use crate::storage::{
    AnalyticsStore, DeviceHistoryStore, InMemoryStores, StorageError, SurveyRepository, TriggerRepository,
};
use crate::survey::{DeviceId, Survey, SurveyId};
use crate::trigger::Trigger;

pub use combinator::combinator_term;
use combinator::{plan, Scope, SurveyCheck};
use diagnostics::DomProbeRunner;
pub use diagnostics::{CancellationToken, ConditionReport, ConditionRole, DiagnosticReport};

use labels::{INLINE_TARGET, SURVEY_EXISTS, TAG_ON_PAGE, TRIGGERS_LOADED};

/// Survey eligibility engine.
#[derive(Clone)]
pub struct TargetingEngine {
    surveys: Arc<dyn SurveyRepository>,
    triggers: Arc<dyn TriggerRepository>,
    analytics: Arc<dyn AnalyticsStore>,
    history: Arc<dyn DeviceHistoryStore>,
    config: EngineConfig,
}

impl TargetingEngine {
    /// Create a new engine using the given stores.
    #[must_use]
    pub fn new(
        surveys: Arc<dyn SurveyRepository>,
        triggers: Arc<dyn TriggerRepository>,
        analytics: Arc<dyn AnalyticsStore>,
        history: Arc<dyn DeviceHistoryStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            surveys,
            triggers,
            analytics,
            history,
            config,
        }
    }

    /// Create an engine whose every collaborator is `stores`.
    #[must_use]
    pub fn in_memory(stores: Arc<InMemoryStores>, config: EngineConfig) -> Self {
        Self::new(
            Arc::clone(&stores) as Arc<dyn SurveyRepository>,
            Arc::clone(&stores) as Arc<dyn TriggerRepository>,
            Arc::clone(&stores) as Arc<dyn AnalyticsStore>,
            stores,
            config,
        )
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn load(&self, survey_id: SurveyId) -> Result<(Survey, Vec<Trigger>), (&'static str, StorageError)> {
        let survey = self.surveys.get_survey(survey_id).map_err(|e| (SURVEY_EXISTS, e))?;
        let triggers = self
            .triggers
            .list_triggers(survey_id)
            .map_err(|e| (TRIGGERS_LOADED, e))?;
        Ok((survey, triggers))
    }

    fn scope<'a>(&'a self, survey: &'a Survey, ctx: &'a VisitorContext) -> Scope<'a> {
        Scope::new(survey, ctx, self.analytics.as_ref(), self.history.as_ref())
    }

    /// The render decision.
    ///
    /// Never fails: unreadable survey configuration means no render, and
    /// unreadable device history means the permissive state.
    #[must_use]
    pub fn decide(&self, survey_id: SurveyId, ctx: &VisitorContext) -> bool {
        let (survey, triggers) = match self.load(survey_id) {
            Ok(loaded) => loaded,
            Err((_, err)) => {
                warn!(survey_id = %survey_id, error = %err, "survey configuration unavailable; not rendering");
                return false;
            }
        };

        let scope = self.scope(&survey, ctx);
        for check in SurveyCheck::ALL {
            let Some(report) = check.evaluate(&scope) else {
                continue;
            };
            if !report.passes() {
                debug!(survey_id = %survey_id, term = %report.label, reason = %report.message, "survey check failed");
                return false;
            }
        }

        for term in plan(&triggers) {
            let report = term.resolve(&mut |trigger| evaluate(trigger, ctx));
            if !report.passes() {
                debug!(survey_id = %survey_id, term = %report.label, reason = %report.message, "trigger term failed");
                return false;
            }
        }
        true
    }

    /// Every condition of the render decision, evaluated without
    /// short-circuiting. DOM-dependent triggers are probed with retries
    /// under the configured deadline.
    #[must_use]
    pub fn diagnose(&self, survey_id: SurveyId, ctx: &VisitorContext) -> DiagnosticReport {
        self.diagnose_with_cancel(survey_id, ctx, &CancellationToken::new())
    }

    /// Like `diagnose`, abandoning outstanding DOM probes once `cancel` fires.
    /// Unresolved DOM entries report `Indeterminate`.
    #[must_use]
    pub fn diagnose_with_cancel(
        &self,
        survey_id: SurveyId,
        ctx: &VisitorContext,
        cancel: &CancellationToken,
    ) -> DiagnosticReport {
        let (survey, triggers) = match self.load(survey_id) {
            Ok(loaded) => loaded,
            Err((label, err)) => {
                warn!(survey_id = %survey_id, error = %err, "survey configuration unavailable");
                let entry = ConditionReport::required(label, EvaluationResult::from_bool(false, err.to_string()));
                return DiagnosticReport::new(survey_id, vec![entry]);
            }
        };

        let scope = self.scope(&survey, ctx);
        let mut conditions: Vec<ConditionReport> = SurveyCheck::ALL
            .iter()
            .filter_map(|check| check.evaluate(&scope))
            .collect();

        let runner = match (ctx.dom_query.as_ref(), ctx.url.as_deref()) {
            (Some(query), Some(url)) if !url.trim().is_empty() => Some(DomProbeRunner::new(
                Arc::clone(query),
                url,
                self.config.dom_query,
                cancel,
            )),
            _ => None,
        };

        let mut eval = |trigger: &Trigger| {
            runner
                .as_ref()
                .and_then(|r| r.evaluate(trigger.kind()))
                .unwrap_or_else(|| evaluate(trigger, ctx))
        };
        conditions.extend(plan(&triggers).iter().map(|term| term.resolve(&mut eval)));

        if let Some(runner) = runner.as_ref() {
            conditions.push(runner.informational(TAG_ON_PAGE, &DomProbe::TagPresent));
            if let Some(selector) = survey.inline_target_selector.as_deref() {
                conditions.push(runner.informational(
                    INLINE_TARGET,
                    &DomProbe::ElementPresent {
                        selector: selector.to_string(),
                    },
                ));
            }
        } else if ctx.dom_query.is_some() && survey.inline_target_selector.is_some() {
            conditions.push(ConditionReport::new(
                INLINE_TARGET,
                EvaluationResult::missing_url(INLINE_TARGET.trim_end_matches('?')),
                ConditionRole::Informational,
            ));
        }

        let report = DiagnosticReport::new(survey_id, conditions);
        let (satisfied, unsatisfied, indeterminate) = report.counts();
        info!(
            survey_id = %survey_id,
            report_id = %report.report_id,
            satisfied,
            unsatisfied,
            indeterminate,
            eligible = report.eligible(),
            cancelled = cancel.is_cancelled(),
            "diagnostic run complete"
        );
        report
    }

    fn survey_account(&self, survey_id: SurveyId, action: &'static str) -> Option<Survey> {
        match self.surveys.get_survey(survey_id) {
            Ok(survey) => Some(survey),
            Err(err) => {
                warn!(survey_id = %survey_id, error = %err, action, "cannot record device history");
                None
            }
        }
    }

    /// Records that `survey` was shown to `device`. Failures are logged.
    pub fn record_impression(&self, survey_id: SurveyId, device: &DeviceId, at: DateTime<Utc>) {
        let Some(survey) = self.survey_account(survey_id, "impression") else {
            return;
        };
        if let Err(err) = self.history.record_impression(device, survey.account_id, survey_id, at) {
            warn!(survey_id = %survey_id, device = %device, error = %err, "impression not recorded");
        }
    }

    /// Records a completed response. Failures are logged.
    pub fn record_completion(&self, survey_id: SurveyId, device: &DeviceId, at: DateTime<Utc>) {
        if let Err(err) = self.history.record_completion(device, survey_id, at) {
            warn!(survey_id = %survey_id, device = %device, error = %err, "completion not recorded");
        }
    }

    /// Records that the survey was closed without an answer. Failures are logged.
    pub fn record_dismissal(&self, survey_id: SurveyId, device: &DeviceId, at: DateTime<Utc>) {
        if let Err(err) = self.history.record_dismissal(device, survey_id, at) {
            warn!(survey_id = %survey_id, device = %device, error = %err, "dismissal not recorded");
        }
    }
}

/// Fixed labels of the non-trigger diagnostic entries.
pub mod labels {
    pub use super::combinator::{DEVICE_TYPE, FREQUENCY_CAP, GOAL, LIVE, NOT_DISMISSED, REFIRE, SCHEDULE};

    pub const SURVEY_EXISTS: &str = "Does the survey exist?";
    pub const TRIGGERS_LOADED: &str = "Can the survey's triggers be loaded?";
    pub const TAG_ON_PAGE: &str = "Is the tag on the page?";
    pub const INLINE_TARGET: &str = "Is the inline target on the page?";
}
