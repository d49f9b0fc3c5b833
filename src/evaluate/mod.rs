//! Predicate evaluation.
//!
//! `evaluate` maps one trigger and a visitor context to a tri-state outcome.
//! It is pure: the only collaborator it may touch is the DOM query carried
//! by the context, and it never applies suppresser polarity.

mod device_data;
pub(crate) mod dom;
mod predicates;

use std::fmt;

use serde::Serialize;

use crate::context::VisitorContext;
use crate::trigger::{Trigger, TriggerKind};

/// Prefix of every message produced because no URL was supplied.
pub const PROVIDE_URL: &str = "PROVIDE URL TO CHECK";

/// Prefix of every message produced because no device id was supplied.
pub const PROVIDE_DEVICE_UDID: &str = "PROVIDE DEVICE UDID TO CHECK";

/// Three-valued outcome of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    True,
    False,
    /// Cannot be decided with the context given.
    Indeterminate,
}

impl TriState {
    #[must_use]
    pub const fn from_bool(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }

    #[must_use]
    pub const fn is_true(self) -> bool {
        matches!(self, Self::True)
    }

    #[must_use]
    pub const fn is_false(self) -> bool {
        matches!(self, Self::False)
    }

    #[must_use]
    pub const fn is_indeterminate(self) -> bool {
        matches!(self, Self::Indeterminate)
    }

    /// Collapses to a render decision: `Indeterminate` counts as false.
    #[must_use]
    pub const fn coerce(self) -> bool {
        self.is_true()
    }

    /// Logical negation; `Indeterminate` stays `Indeterminate`.
    #[must_use]
    pub const fn negate(self) -> Self {
        match self {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Indeterminate => Self::Indeterminate,
        }
    }

    /// Kleene conjunction.
    #[must_use]
    pub const fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::False, _) | (_, Self::False) => Self::False,
            (Self::True, Self::True) => Self::True,
            _ => Self::Indeterminate,
        }
    }

    /// Kleene disjunction.
    #[must_use]
    pub const fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::True, _) | (_, Self::True) => Self::True,
            (Self::False, Self::False) => Self::False,
            _ => Self::Indeterminate,
        }
    }
}

impl From<bool> for TriState {
    fn from(value: bool) -> Self {
        Self::from_bool(value)
    }
}

impl fmt::Display for TriState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::True => "true",
            Self::False => "false",
            Self::Indeterminate => "indeterminate",
        };
        f.write_str(s)
    }
}

/// Outcome of evaluating one trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationResult {
    pub satisfied: TriState,
    pub message: String,
}

impl EvaluationResult {
    #[must_use]
    pub fn new(satisfied: TriState, message: impl Into<String>) -> Self {
        Self {
            satisfied,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn from_bool(satisfied: bool, message: impl Into<String>) -> Self {
        Self::new(TriState::from_bool(satisfied), message)
    }

    #[must_use]
    pub fn indeterminate(message: impl Into<String>) -> Self {
        Self::new(TriState::Indeterminate, message)
    }

    /// Indeterminate because the visitor URL is missing.
    #[must_use]
    pub fn missing_url(label: &str) -> Self {
        Self::indeterminate(format!("{PROVIDE_URL} -- {label}?"))
    }

    /// Indeterminate because the device id is missing.
    #[must_use]
    pub fn missing_device(label: &str) -> Self {
        Self::indeterminate(format!("{PROVIDE_DEVICE_UDID} -- {label}"))
    }
}

/// Evaluates `trigger` against `ctx` without applying its polarity.
///
/// ```
/// use survey_targeting::{evaluate, TriState, Trigger, VisitorContext};
///
/// let trigger = Trigger::url_contains("foo.com/bar").unwrap();
/// let ctx = VisitorContext::new().with_url("https://foo.com/bar/baz");
/// assert_eq!(evaluate(&trigger, &ctx).satisfied, TriState::True);
///
/// let no_url = VisitorContext::new();
/// assert_eq!(evaluate(&trigger, &no_url).satisfied, TriState::Indeterminate);
/// ```
#[must_use]
pub fn evaluate(trigger: &Trigger, ctx: &VisitorContext) -> EvaluationResult {
    evaluate_kind(trigger.kind(), ctx)
}

/// Evaluates a bare kind. DOM-dependent kinds make at most one collaborator call.
#[must_use]
pub fn evaluate_kind(kind: &TriggerKind, ctx: &VisitorContext) -> EvaluationResult {
    match kind {
        TriggerKind::UrlContains { url } => predicates::url_contains(kind, url, ctx),
        TriggerKind::UrlEquals { url } => predicates::url_equals(kind, url, ctx),
        TriggerKind::RegexMatches { pattern } => predicates::regex_matches(kind, pattern, ctx),
        TriggerKind::DeviceData {
            key, matcher, value, ..
        } => device_data::evaluate(key, *matcher, value.as_deref(), ctx),
        TriggerKind::Geo {
            country,
            state_or_dma,
        } => predicates::geo(country, state_or_dma.as_deref(), ctx),
        TriggerKind::PseudoEvent { event } => predicates::pseudo_event(event, ctx),
        TriggerKind::PreviousAnswer {
            survey_id,
            possible_answer_id,
        } => predicates::previous_answer(*survey_id, *possible_answer_id, ctx),
        TriggerKind::MobilePageview { view_name } => predicates::mobile_pageview(view_name, ctx),
        TriggerKind::MobileRegexp { pattern } => predicates::mobile_regexp(pattern, ctx),
        TriggerKind::MobileInstall { days_installed } => {
            predicates::at_least("days installed", ctx.days_installed, *days_installed)
        }
        TriggerKind::MobileLaunch { launch_times } => {
            predicates::at_least("launch count", ctx.launch_times, *launch_times)
        }
        TriggerKind::PageScroll { percent } => predicates::at_least(
            "scroll percentage",
            ctx.scroll_percentage.map(u32::from),
            u32::from(*percent),
        ),
        TriggerKind::PageAfterSeconds { seconds } => {
            predicates::at_least("seconds on page", ctx.elapsed_seconds, *seconds)
        }
        TriggerKind::PageIntentExit => predicates::intent_exit(ctx),
        TriggerKind::PageElementVisible { .. }
        | TriggerKind::PageElementClicked { .. }
        | TriggerKind::TextOnPage { .. } => dom::evaluate_once(kind, ctx),
        TriggerKind::ClientKeyPresence { present } => predicates::client_key(*present, ctx),
        TriggerKind::Visit {
            visitor_type,
            visits_count,
        } => predicates::visit(*visitor_type, *visits_count, ctx),
        TriggerKind::Pageview { pageviews_count } => {
            predicates::at_least("pageview count", ctx.pageview_count, *pageviews_count)
        }
    }
}
