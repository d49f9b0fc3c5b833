//! Eligibility combinator.
//!
//! The render decision is an AND over survey-level checks and trigger
//! terms. Both `decide` and `diagnose` build the same `ConditionReport`
//! values; `decide` stops at the first one that does not pass.

use std::cell::OnceCell;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::diagnostics::{ConditionReport, ConditionRole};
use crate::context::VisitorContext;
use crate::evaluate::{evaluate, EvaluationResult, TriState};
use crate::history::DeviceHistory;
use crate::state::{FrequencyCapState, RefireState};
use crate::storage::{AnalyticsStore, DeviceHistoryStore, ImpressionLog, StorageError};
use crate::survey::{CapScope, DeviceTargeting, Survey};
use crate::trigger::{Trigger, TriggerKind};

pub const LIVE: &str = "Is the survey live?";
pub const SCHEDULE: &str = "Inside target date range?";
pub const GOAL: &str = "Survey goal not yet reached?";
pub const DEVICE_TYPE: &str = "Is the survey enabled for this device type?";
pub const FREQUENCY_CAP: &str = "Device below frequency cap?";
pub const REFIRE: &str = "Device eligible for refire?";
pub const NOT_DISMISSED: &str = "Survey not closed without an answer?";
const GEO_GROUP: &str = "Is the visitor inside a targeted region?";
const DEVICE_DATA_GROUP: &str = "Is any optional device data trigger satisfied?";

/// The AND-term a single trigger contributes on its own.
///
/// Suppressers negate the evaluation after `Indeterminate` has been coerced
/// to false, so an undecidable suppresser never blocks the survey.
///
/// ```
/// use survey_targeting::{combinator_term, Trigger, VisitorContext};
///
/// let ctx = VisitorContext::new().with_url("https://site.com/pricing");
/// let trigger = Trigger::url_contains("/pricing").unwrap();
/// assert!(combinator_term(&trigger, &ctx));
/// assert!(!combinator_term(&trigger.clone().excluded(), &ctx));
///
/// let no_url = VisitorContext::new();
/// assert!(combinator_term(&trigger.excluded(), &no_url));
/// ```
#[must_use]
pub fn combinator_term(trigger: &Trigger, ctx: &VisitorContext) -> bool {
    let satisfied = evaluate(trigger, ctx).satisfied.coerce();
    if trigger.is_excluded() {
        !satisfied
    } else {
        satisfied
    }
}

/// Triggers evaluated together as one any-of term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TriggerGroup {
    Geo,
    OptionalDeviceData,
}

impl TriggerGroup {
    const fn of(trigger: &Trigger) -> Option<Self> {
        if trigger.is_excluded() {
            return None;
        }
        match trigger.kind() {
            TriggerKind::Geo { .. } => Some(Self::Geo),
            TriggerKind::DeviceData { mandatory: false, .. } => Some(Self::OptionalDeviceData),
            _ => None,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Geo => GEO_GROUP,
            Self::OptionalDeviceData => DEVICE_DATA_GROUP,
        }
    }
}

/// One AND-term built from a survey's triggers.
#[derive(Debug)]
pub(crate) enum TriggerTerm<'a> {
    Single(&'a Trigger),
    AnyOf {
        group: TriggerGroup,
        members: Vec<&'a Trigger>,
    },
}

/// Groups triggers into AND-terms, keeping the position of each group's
/// first member.
pub(crate) fn plan(triggers: &[Trigger]) -> Vec<TriggerTerm<'_>> {
    let mut terms: Vec<TriggerTerm<'_>> = Vec::with_capacity(triggers.len());
    for trigger in triggers {
        let Some(group) = TriggerGroup::of(trigger) else {
            terms.push(TriggerTerm::Single(trigger));
            continue;
        };
        let existing = terms.iter_mut().find_map(|term| match term {
            TriggerTerm::AnyOf { group: g, members } if *g == group => Some(members),
            _ => None,
        });
        match existing {
            Some(members) => members.push(trigger),
            None => terms.push(TriggerTerm::AnyOf {
                group,
                members: vec![trigger],
            }),
        }
    }
    terms
}

impl TriggerTerm<'_> {
    /// Evaluates the term with `eval`, applying polarity and grouping.
    pub(crate) fn resolve<F>(&self, eval: &mut F) -> ConditionReport
    where
        F: FnMut(&Trigger) -> EvaluationResult,
    {
        match self {
            TriggerTerm::Single(trigger) => {
                let result = eval(trigger);
                if trigger.is_excluded() {
                    ConditionReport::new(
                        trigger.summary(),
                        EvaluationResult::new(result.satisfied.negate(), result.message),
                        ConditionRole::FailOpen,
                    )
                } else {
                    ConditionReport::required(format!("{}?", trigger.summary()), result)
                }
            }
            TriggerTerm::AnyOf { group, members } => {
                let mut satisfied = TriState::False;
                let mut parts = Vec::with_capacity(members.len());
                for trigger in members {
                    let result = eval(trigger);
                    satisfied = satisfied.or(result.satisfied);
                    parts.push(format!("{}: {}", trigger.kind(), result.satisfied));
                }
                ConditionReport::required(group.label(), EvaluationResult::new(satisfied, parts.join("; ")))
            }
        }
    }
}

/// Device history for the request, fetched at most once.
#[derive(Debug)]
pub(crate) enum DeviceRecord {
    /// No device id in the context.
    Anonymous,
    Unavailable(StorageError),
    Known(Option<DeviceHistory>),
}

/// Everything a survey-level check reads.
pub(crate) struct Scope<'a> {
    pub(crate) survey: &'a Survey,
    pub(crate) ctx: &'a VisitorContext,
    analytics: &'a dyn AnalyticsStore,
    history: &'a dyn DeviceHistoryStore,
    device: OnceCell<DeviceRecord>,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(
        survey: &'a Survey,
        ctx: &'a VisitorContext,
        analytics: &'a dyn AnalyticsStore,
        history: &'a dyn DeviceHistoryStore,
    ) -> Self {
        Self {
            survey,
            ctx,
            analytics,
            history,
            device: OnceCell::new(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.ctx.evaluated_at
    }

    fn device_record(&self) -> &DeviceRecord {
        self.device.get_or_init(|| {
            let Some(device) = self.ctx.device_id.as_ref() else {
                return DeviceRecord::Anonymous;
            };
            match self.history.get(device, self.survey.id) {
                Ok(history) => DeviceRecord::Known(history),
                Err(err) => {
                    warn!(survey_id = %self.survey.id, device = %device, error = %err,
                        "device history read failed; using permissive state");
                    DeviceRecord::Unavailable(err)
                }
            }
        })
    }
}

/// Survey-level checks in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SurveyCheck {
    Live,
    Schedule,
    Goal,
    DeviceType,
    FrequencyCap,
    Refire,
    NotDismissed,
}

impl SurveyCheck {
    pub const ALL: [Self; 7] = [
        Self::Live,
        Self::Schedule,
        Self::Goal,
        Self::DeviceType,
        Self::FrequencyCap,
        Self::Refire,
        Self::NotDismissed,
    ];

    /// The check's report, or None when the survey does not configure it.
    pub(crate) fn evaluate(self, scope: &Scope<'_>) -> Option<ConditionReport> {
        match self {
            Self::Live => Some(live(scope.survey)),
            Self::Schedule => Some(schedule(scope.survey, scope.now())),
            Self::Goal => Some(goal(scope)),
            Self::DeviceType => device_type(scope),
            Self::FrequencyCap => Some(frequency_cap(scope)),
            Self::Refire => Some(refire(scope)),
            Self::NotDismissed => not_dismissed(scope),
        }
    }
}

fn live(survey: &Survey) -> ConditionReport {
    ConditionReport::required(
        LIVE,
        EvaluationResult::from_bool(survey.is_live(), format!("status is {}", survey.status)),
    )
}

fn schedule(survey: &Survey, now: DateTime<Utc>) -> ConditionReport {
    let inside = survey.schedule.contains(now);
    let message = if survey.schedule.is_unbounded() {
        "no date bounds".to_string()
    } else {
        format!("{now} against {}", survey.schedule)
    };
    ConditionReport::required(SCHEDULE, EvaluationResult::from_bool(inside, message))
}

fn goal(scope: &Scope<'_>) -> ConditionReport {
    let survey = scope.survey;
    let result = match scope.analytics.submissions_count(survey.id) {
        Ok(submissions) => EvaluationResult::from_bool(
            !survey.goal_reached(submissions),
            format!("{submissions} of {} submissions", survey.goal),
        ),
        Err(err) => {
            warn!(survey_id = %survey.id, error = %err,
                "submission count unavailable; treating goal as not reached");
            EvaluationResult::from_bool(true, format!("submission count unavailable ({err})"))
        }
    };
    ConditionReport::required(GOAL, result)
}

fn device_type(scope: &Scope<'_>) -> Option<ConditionReport> {
    let targeting = scope.survey.device_targeting;
    if targeting == DeviceTargeting::all() {
        return None;
    }
    let result = match scope.ctx.device_type {
        Some(device_type) => EvaluationResult::from_bool(
            targeting.allows(device_type),
            format!("device type is {device_type}"),
        ),
        None => EvaluationResult::from_bool(true, "device type unknown"),
    };
    Some(ConditionReport::required(DEVICE_TYPE, result))
}

fn permissive(label: &str, err: &StorageError) -> ConditionReport {
    ConditionReport::required(
        label,
        EvaluationResult::from_bool(true, format!("device history unavailable ({err})")),
    )
}

fn frequency_cap(scope: &Scope<'_>) -> ConditionReport {
    let survey = scope.survey;
    let cap = &survey.frequency_cap;
    if survey.ignore_frequency_cap {
        return ConditionReport::required(
            FREQUENCY_CAP,
            EvaluationResult::from_bool(true, "survey ignores the frequency cap"),
        );
    }
    if !cap.enabled {
        return ConditionReport::required(
            FREQUENCY_CAP,
            EvaluationResult::from_bool(true, "frequency cap disabled"),
        );
    }
    let Some(device) = scope.ctx.device_id.as_ref() else {
        return ConditionReport::new(
            FREQUENCY_CAP,
            EvaluationResult::missing_device(FREQUENCY_CAP),
            ConditionRole::FailOpen,
        );
    };

    let log = match cap.scope {
        CapScope::PerSurvey => match scope.device_record() {
            DeviceRecord::Known(history) => history.as_ref().map(ImpressionLog::from_history).unwrap_or_default(),
            DeviceRecord::Unavailable(err) => return permissive(FREQUENCY_CAP, err),
            DeviceRecord::Anonymous => ImpressionLog::default(),
        },
        CapScope::PerAccount => match scope.history.account_impressions(device, survey.account_id) {
            Ok(log) => log,
            Err(err) => {
                warn!(survey_id = %survey.id, device = %device, error = %err,
                    "account impressions unavailable; treating device as below cap");
                return permissive(FREQUENCY_CAP, &err);
            }
        },
    };

    let result = match FrequencyCapState::compute(cap, &log.timestamps, log.lifetime_count, scope.now()) {
        FrequencyCapState::BelowCap => EvaluationResult::from_bool(true, format!("below cap of {}", cap.limit)),
        FrequencyCapState::AtCap { until: Some(until) } => {
            EvaluationResult::from_bool(false, format!("cap of {} reached until {until}", cap.limit))
        }
        FrequencyCapState::AtCap { until: None } => {
            EvaluationResult::from_bool(false, format!("lifetime cap of {} reached", cap.limit))
        }
    };
    ConditionReport::required(FREQUENCY_CAP, result)
}

fn refire(scope: &Scope<'_>) -> ConditionReport {
    let history = match scope.device_record() {
        // Without a device there is no completed response to refire from.
        DeviceRecord::Anonymous => {
            return ConditionReport::required(
                REFIRE,
                EvaluationResult::from_bool(true, "no device id; no completed response"),
            )
        }
        DeviceRecord::Unavailable(err) => return permissive(REFIRE, err),
        DeviceRecord::Known(history) => history.as_ref(),
    };
    let result = match RefireState::compute(scope.survey, history, scope.now()) {
        RefireState::NeverShown => EvaluationResult::from_bool(true, "no completed response"),
        RefireState::Eligible => EvaluationResult::from_bool(true, "refire interval elapsed"),
        RefireState::AwaitingRefire { eligible_at } => {
            EvaluationResult::from_bool(false, format!("eligible again at {eligible_at}"))
        }
        RefireState::Suppressed => EvaluationResult::from_bool(false, "completed and refire disabled"),
    };
    ConditionReport::required(REFIRE, result)
}

fn not_dismissed(scope: &Scope<'_>) -> Option<ConditionReport> {
    if !scope.survey.stop_showing_without_answer {
        return None;
    }
    Some(match scope.device_record() {
        DeviceRecord::Anonymous => ConditionReport::new(
            NOT_DISMISSED,
            EvaluationResult::missing_device(NOT_DISMISSED),
            ConditionRole::FailOpen,
        ),
        DeviceRecord::Unavailable(err) => permissive(NOT_DISMISSED, err),
        DeviceRecord::Known(history) => {
            let dismissed = history.as_ref().is_some_and(DeviceHistory::dismissed_without_answer);
            let message = if dismissed {
                "closed without an answer"
            } else {
                "not dismissed"
            };
            ConditionReport::required(NOT_DISMISSED, EvaluationResult::from_bool(!dismissed, message))
        }
    })
}
