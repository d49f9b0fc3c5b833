//! Trigger catalog.
//!
//! A `Trigger` is an inclusion condition attached to a survey; with
//! `excluded` set it acts as a suppresser. Polarity is applied by the
//! combinator, never by the evaluator.
//!
//! ```
//! use survey_targeting::Trigger;
//!
//! let trigger = Trigger::url_equals("https://foo.com/bar/").unwrap();
//! assert_eq!(trigger.to_string(), "URL same as target (foo.com/bar)");
//!
//! let suppresser = Trigger::url_contains("/checkout").unwrap().excluded();
//! assert!(suppresser.is_excluded());
//! ```

mod kinds;
mod record;
pub mod url;

use std::fmt;

pub use kinds::{
    DeviceDataMatcher, TriggerKind, TriggerPattern, VisitorType, DEFAULT_REGEX_SIZE_LIMIT,
};
pub use record::{TriggerRecord, VisitorTypeField};

use crate::error::ValidationError;
use crate::survey::{PossibleAnswerId, SurveyId, TriggerId};

/// A validated trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    /// Persisted row id, when loaded from a repository.
    pub id: Option<TriggerId>,
    kind: TriggerKind,
    excluded: bool,
}

fn non_empty(kind: &'static str, field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField { kind, field });
    }
    Ok(trimmed.to_string())
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

impl Trigger {
    /// Wraps an already-valid kind as an inclusion trigger.
    fn from_kind(kind: TriggerKind) -> Self {
        Self {
            id: None,
            kind,
            excluded: false,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &TriggerKind {
        &self.kind
    }

    #[must_use]
    pub const fn is_excluded(&self) -> bool {
        self.excluded
    }

    /// Turns this trigger into a suppresser.
    #[must_use]
    pub fn excluded(mut self) -> Self {
        self.excluded = true;
        self
    }

    /// Sets the suppresser flag explicitly.
    #[must_use]
    pub fn with_excluded(mut self, excluded: bool) -> Self {
        self.excluded = excluded;
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: TriggerId) -> Self {
        self.id = Some(id);
        self
    }

    /// Creates a `UrlContains` trigger; the scheme is stripped.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingField` if nothing remains after normalization.
    pub fn url_contains(url: &str) -> Result<Self, ValidationError> {
        let url = non_empty("url_contains", "url", &url::normalize_fragment(url))?;
        Ok(Self::from_kind(TriggerKind::UrlContains { url }))
    }

    /// Creates a `UrlEquals` trigger; scheme and a trailing slash are stripped.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingField` if nothing remains after normalization.
    pub fn url_equals(url: &str) -> Result<Self, ValidationError> {
        let url = non_empty("url_equals", "url_matches", &url::normalize_exact(url))?;
        Ok(Self::from_kind(TriggerKind::UrlEquals { url }))
    }

    /// Creates a `RegexMatches` trigger with the default size limit.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidRegex` if the pattern does not compile.
    pub fn regex_matches(pattern: &str) -> Result<Self, ValidationError> {
        Self::regex_matches_with_limit(pattern, DEFAULT_REGEX_SIZE_LIMIT)
    }

    pub(crate) fn regex_matches_with_limit(pattern: &str, limit: usize) -> Result<Self, ValidationError> {
        let pattern = TriggerPattern::compile(pattern, limit)?;
        Ok(Self::from_kind(TriggerKind::RegexMatches { pattern }))
    }

    /// Creates a mandatory `DeviceData` trigger.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingField` when the key is blank or a
    /// value-taking matcher has no value, `UnexpectedField` when
    /// `is_true`/`is_not_true` is given a value, and `NonNumericValue` when a
    /// numeric matcher is given text.
    pub fn device_data(
        key: &str,
        matcher: DeviceDataMatcher,
        value: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let key = non_empty("device_data", "device_data_key", key)?;
        let value = optional_text(value);
        match (matcher.takes_value(), &value) {
            (true, None) => {
                return Err(ValidationError::MissingField {
                    kind: "device_data",
                    field: "device_data_value",
                })
            }
            (false, Some(_)) => {
                return Err(ValidationError::UnexpectedField {
                    kind: "device_data",
                    field: "device_data_value",
                })
            }
            _ => {}
        }
        if matcher.is_numeric() {
            if let Some(v) = &value {
                if v.parse::<f64>().map_or(true, |n| !n.is_finite()) {
                    return Err(ValidationError::NonNumericValue {
                        kind: "device_data",
                        field: "device_data_value",
                        value: v.clone(),
                    });
                }
            }
        }
        Ok(Self::from_kind(TriggerKind::DeviceData {
            key,
            matcher,
            value,
            mandatory: true,
        }))
    }

    /// Marks a `DeviceData` trigger as optional (any-of group). No-op for other kinds.
    #[must_use]
    pub fn optional(mut self) -> Self {
        if let TriggerKind::DeviceData { mandatory, .. } = &mut self.kind {
            *mandatory = false;
        }
        self
    }

    /// Creates a `Geo` trigger.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingField` if the country is blank.
    pub fn geo(country: &str, state_or_dma: Option<&str>) -> Result<Self, ValidationError> {
        let country = non_empty("geo", "geo_country", country)?;
        Ok(Self::from_kind(TriggerKind::Geo {
            country,
            state_or_dma: optional_text(state_or_dma),
        }))
    }

    /// Creates a `PseudoEvent` trigger.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingField` if the event name is blank.
    pub fn pseudo_event(event: &str) -> Result<Self, ValidationError> {
        let event = non_empty("pseudo_event", "pseudo_event", event)?;
        Ok(Self::from_kind(TriggerKind::PseudoEvent { event }))
    }

    #[must_use]
    pub fn previous_answer(survey_id: SurveyId, possible_answer_id: PossibleAnswerId) -> Self {
        Self::from_kind(TriggerKind::PreviousAnswer {
            survey_id,
            possible_answer_id,
        })
    }

    /// Creates a `MobilePageview` trigger.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingField` if the view name is blank.
    pub fn mobile_pageview(view_name: &str) -> Result<Self, ValidationError> {
        let view_name = non_empty("mobile_pageview", "mobile_pageview", view_name)?;
        Ok(Self::from_kind(TriggerKind::MobilePageview { view_name }))
    }

    /// Creates a `MobileRegexp` trigger with the default size limit.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidRegex` if the pattern does not compile.
    pub fn mobile_regexp(pattern: &str) -> Result<Self, ValidationError> {
        Self::mobile_regexp_with_limit(pattern, DEFAULT_REGEX_SIZE_LIMIT)
    }

    pub(crate) fn mobile_regexp_with_limit(pattern: &str, limit: usize) -> Result<Self, ValidationError> {
        let pattern = TriggerPattern::compile(pattern, limit)?;
        Ok(Self::from_kind(TriggerKind::MobileRegexp { pattern }))
    }

    #[must_use]
    pub fn mobile_install(days_installed: u32) -> Self {
        Self::from_kind(TriggerKind::MobileInstall { days_installed })
    }

    #[must_use]
    pub fn mobile_launch(launch_times: u32) -> Self {
        Self::from_kind(TriggerKind::MobileLaunch { launch_times })
    }

    /// Creates a `PageScroll` trigger.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::OutOfRange` if `percent` exceeds 100.
    pub fn page_scroll(percent: u8) -> Result<Self, ValidationError> {
        if percent > 100 {
            return Err(ValidationError::OutOfRange {
                field: "render_after_x_percent_scroll",
                value: i64::from(percent),
                min: 0,
                max: 100,
            });
        }
        Ok(Self::from_kind(TriggerKind::PageScroll { percent }))
    }

    #[must_use]
    pub fn page_after_seconds(seconds: u32) -> Self {
        Self::from_kind(TriggerKind::PageAfterSeconds { seconds })
    }

    #[must_use]
    pub fn page_intent_exit() -> Self {
        Self::from_kind(TriggerKind::PageIntentExit)
    }

    /// Creates a `PageElementVisible` trigger.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingField` if the selector is blank.
    pub fn page_element_visible(selector: &str) -> Result<Self, ValidationError> {
        let selector = non_empty("page_element_visible", "render_after_element_visible", selector)?;
        Ok(Self::from_kind(TriggerKind::PageElementVisible { selector }))
    }

    /// Creates a `PageElementClicked` trigger.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingField` if the selector is blank.
    pub fn page_element_clicked(selector: &str) -> Result<Self, ValidationError> {
        let selector = non_empty("page_element_clicked", "render_after_element_clicked", selector)?;
        Ok(Self::from_kind(TriggerKind::PageElementClicked { selector }))
    }

    /// Creates a `TextOnPage` trigger.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingField` if the selector or text is blank.
    pub fn text_on_page(selector: &str, text: &str, presence: bool) -> Result<Self, ValidationError> {
        let selector = non_empty("text_on_page", "text_on_page_selector", selector)?;
        let text = non_empty("text_on_page", "text_on_page_value", text)?;
        Ok(Self::from_kind(TriggerKind::TextOnPage {
            selector,
            text,
            presence,
        }))
    }

    #[must_use]
    pub fn client_key_presence(present: bool) -> Self {
        Self::from_kind(TriggerKind::ClientKeyPresence { present })
    }

    #[must_use]
    pub fn visit(visitor_type: VisitorType, visits_count: u32) -> Self {
        Self::from_kind(TriggerKind::Visit {
            visitor_type,
            visits_count,
        })
    }

    #[must_use]
    pub fn pageview(pageviews_count: u32) -> Self {
        Self::from_kind(TriggerKind::Pageview { pageviews_count })
    }
}

impl Trigger {
    /// Human-readable description used for diagnostic labels.
    #[must_use]
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.excluded {
            write!(f, "Suppress if: {}", self.kind)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_contains_strips_scheme() {
        let trigger = Trigger::url_contains("https://foo.com/bar").unwrap();
        assert_eq!(
            trigger.kind(),
            &TriggerKind::UrlContains {
                url: "foo.com/bar".to_string()
            }
        );
        assert!(!trigger.is_excluded());
    }

    #[test]
    fn test_url_equals_normalizes() {
        let trigger = Trigger::url_equals("http://foo.com/bar/").unwrap();
        assert_eq!(
            trigger.kind(),
            &TriggerKind::UrlEquals {
                url: "foo.com/bar".to_string()
            }
        );
    }

    #[test]
    fn test_blank_url_rejected() {
        assert!(matches!(
            Trigger::url_contains("https://").unwrap_err(),
            ValidationError::MissingField { field: "url", .. }
        ));
        assert!(Trigger::url_equals("  ").is_err());
    }

    #[test]
    fn test_device_data_value_rules() {
        assert!(Trigger::device_data("plan", DeviceDataMatcher::Is, Some("gold")).is_ok());
        assert!(matches!(
            Trigger::device_data("plan", DeviceDataMatcher::Is, None).unwrap_err(),
            ValidationError::MissingField { .. }
        ));
        assert!(matches!(
            Trigger::device_data("beta", DeviceDataMatcher::IsTrue, Some("yes")).unwrap_err(),
            ValidationError::UnexpectedField { .. }
        ));
        assert!(Trigger::device_data("beta", DeviceDataMatcher::IsTrue, None).is_ok());
        let err = Trigger::device_data("seats", DeviceDataMatcher::IsMoreThan, Some("many")).unwrap_err();
        assert_eq!(
            err,
            ValidationError::NonNumericValue {
                kind: "device_data",
                field: "device_data_value",
                value: "many".to_string(),
            }
        );
        assert!(!err.to_string().contains("engine configuration"));
        assert!(Trigger::device_data(" ", DeviceDataMatcher::IsTrue, None).is_err());
    }

    #[test]
    fn test_optional_device_data() {
        let trigger = Trigger::device_data("plan", DeviceDataMatcher::Is, Some("gold"))
            .unwrap()
            .optional();
        assert!(matches!(
            trigger.kind(),
            TriggerKind::DeviceData { mandatory: false, .. }
        ));
    }

    #[test]
    fn test_page_scroll_range() {
        assert!(Trigger::page_scroll(100).is_ok());
        assert!(Trigger::page_scroll(101).is_err());
    }

    #[test]
    fn test_geo_blank_region_is_none() {
        let trigger = Trigger::geo("US", Some("")).unwrap();
        assert_eq!(
            trigger.kind(),
            &TriggerKind::Geo {
                country: "US".to_string(),
                state_or_dma: None
            }
        );
        assert!(Trigger::geo("", None).is_err());
    }

    #[test]
    fn test_excluded_display() {
        let trigger = Trigger::pseudo_event("checkout").unwrap().excluded();
        assert!(trigger.is_excluded());
        assert!(trigger.to_string().starts_with("Suppress if:"));
        assert!(trigger.with_excluded(false).to_string().starts_with("Present alias"));
    }
}
