//! Per-request visitor signals.
//!
//! A `VisitorContext` is built for every evaluation and never persisted.
//! Every signal is optional: an evaluator whose signal is missing reports
//! `Indeterminate` instead of guessing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ExecutionError;
use crate::survey::{DeviceId, DeviceType, PossibleAnswerId, SurveyId};
use crate::value::DeviceValue;

/// What a DOM-backed trigger asks of a live page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DomProbe {
    ElementVisible { selector: String },
    ElementClicked { selector: String },
    /// Element matching `selector` contains `text`.
    TextOnPage { selector: String, text: String },
    /// Element matching `selector` exists (inline survey target).
    ElementPresent { selector: String },
    /// The survey tag is installed on the page.
    TagPresent,
}

impl fmt::Display for DomProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ElementVisible { selector } => write!(f, "visible({selector})"),
            Self::ElementClicked { selector } => write!(f, "clicked({selector})"),
            Self::TextOnPage { selector, text } => write!(f, "text({selector}, {text:?})"),
            Self::ElementPresent { selector } => write!(f, "present({selector})"),
            Self::TagPresent => write!(f, "tag"),
        }
    }
}

/// A single answer from the DOM collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomObservation {
    /// The probe was decided.
    Found(bool),
    /// The page has not settled yet; asking again later may decide it.
    Pending,
}

/// Browser-backed page inspection, injected by the caller.
///
/// Implementations may block; the diagnostic reporter bounds every call
/// with a timeout and runs it off the calling thread.
pub trait DomQuery: Send + Sync {
    /// Runs `probe` against the page at `url`.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::DomQuery` when the page cannot be inspected.
    fn query(&self, url: &str, probe: &DomProbe) -> Result<DomObservation, ExecutionError>;
}

impl<F> DomQuery for F
where
    F: Fn(&str, &DomProbe) -> Result<DomObservation, ExecutionError> + Send + Sync,
{
    fn query(&self, url: &str, probe: &DomProbe) -> Result<DomObservation, ExecutionError> {
        self(url, probe)
    }
}

/// Visitor location as resolved by the serving layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GeoLocation {
    pub country: String,
    pub state: Option<String>,
    /// Nielsen DMA code.
    pub metro_code: Option<String>,
}

impl GeoLocation {
    #[must_use]
    pub fn new(country: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            state: None,
            metro_code: None,
        }
    }

    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    #[must_use]
    pub fn with_metro_code(mut self, code: impl Into<String>) -> Self {
        self.metro_code = Some(code.into());
        self
    }
}

/// Signals available for one evaluation.
///
/// ```
/// use survey_targeting::{DeviceValue, VisitorContext};
///
/// let ctx = VisitorContext::new()
///     .with_url("https://site.com/pricing")
///     .with_device_id("udid-1")
///     .with_device_data("plan", DeviceValue::from("gold"));
/// assert_eq!(ctx.url.as_deref(), Some("https://site.com/pricing"));
/// ```
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct VisitorContext {
    pub url: Option<String>,
    pub device_id: Option<DeviceId>,
    pub device_type: Option<DeviceType>,
    pub pageview_count: Option<u32>,
    pub visit_count: Option<u32>,
    pub days_installed: Option<u32>,
    pub launch_times: Option<u32>,
    /// None means the device-data map was not supplied at all.
    pub device_data: Option<HashMap<String, DeviceValue>>,
    pub geo: Option<GeoLocation>,
    pub client_key_present: Option<bool>,
    /// Survey to the possible answer the device chose there.
    pub previous_answers: Option<HashMap<SurveyId, PossibleAnswerId>>,
    pub elapsed_seconds: Option<u32>,
    pub scroll_percentage: Option<u8>,
    pub exit_intent: Option<bool>,
    pub mobile_view_name: Option<String>,
    pub fired_pseudo_event: Option<String>,
    #[serde(skip)]
    pub dom_query: Option<Arc<dyn DomQuery>>,
    /// Clock used for schedule, cap, and refire checks.
    pub evaluated_at: DateTime<Utc>,
}

impl VisitorContext {
    /// An empty context evaluated at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            url: None,
            device_id: None,
            device_type: None,
            pageview_count: None,
            visit_count: None,
            days_installed: None,
            launch_times: None,
            device_data: None,
            geo: None,
            client_key_present: None,
            previous_answers: None,
            elapsed_seconds: None,
            scroll_percentage: None,
            exit_intent: None,
            mobile_view_name: None,
            fired_pseudo_event: None,
            dom_query: None,
            evaluated_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_device_id(mut self, id: impl Into<DeviceId>) -> Self {
        self.device_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_device_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = Some(device_type);
        self
    }

    #[must_use]
    pub fn with_pageview_count(mut self, count: u32) -> Self {
        self.pageview_count = Some(count);
        self
    }

    #[must_use]
    pub fn with_visit_count(mut self, count: u32) -> Self {
        self.visit_count = Some(count);
        self
    }

    #[must_use]
    pub fn with_days_installed(mut self, days: u32) -> Self {
        self.days_installed = Some(days);
        self
    }

    #[must_use]
    pub fn with_launch_times(mut self, times: u32) -> Self {
        self.launch_times = Some(times);
        self
    }

    /// Inserts one device-data entry, creating the map if needed.
    #[must_use]
    pub fn with_device_data(mut self, key: impl Into<String>, value: DeviceValue) -> Self {
        self.device_data
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }

    /// Replaces the whole device-data map.
    #[must_use]
    pub fn with_device_data_map(mut self, data: HashMap<String, DeviceValue>) -> Self {
        self.device_data = Some(data);
        self
    }

    #[must_use]
    pub fn with_geo(mut self, geo: GeoLocation) -> Self {
        self.geo = Some(geo);
        self
    }

    #[must_use]
    pub fn with_client_key_present(mut self, present: bool) -> Self {
        self.client_key_present = Some(present);
        self
    }

    /// Records that the device chose `answer` on `survey`.
    #[must_use]
    pub fn with_previous_answer(mut self, survey: SurveyId, answer: PossibleAnswerId) -> Self {
        self.previous_answers
            .get_or_insert_with(HashMap::new)
            .insert(survey, answer);
        self
    }

    #[must_use]
    pub fn with_elapsed_seconds(mut self, seconds: u32) -> Self {
        self.elapsed_seconds = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_scroll_percentage(mut self, percent: u8) -> Self {
        self.scroll_percentage = Some(percent.min(100));
        self
    }

    #[must_use]
    pub fn with_exit_intent(mut self, detected: bool) -> Self {
        self.exit_intent = Some(detected);
        self
    }

    #[must_use]
    pub fn with_mobile_view_name(mut self, name: impl Into<String>) -> Self {
        self.mobile_view_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_pseudo_event(mut self, event: impl Into<String>) -> Self {
        self.fired_pseudo_event = Some(event.into());
        self
    }

    #[must_use]
    pub fn with_dom_query(mut self, query: Arc<dyn DomQuery>) -> Self {
        self.dom_query = Some(query);
        self
    }

    #[must_use]
    pub fn with_evaluated_at(mut self, at: DateTime<Utc>) -> Self {
        self.evaluated_at = at;
        self
    }

    /// Visitor URL with its scheme removed, if a URL was supplied.
    #[must_use]
    pub fn stripped_url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .map(crate::trigger::url::strip_scheme)
            .filter(|u| !u.is_empty())
    }
}

impl Default for VisitorContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for VisitorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisitorContext")
            .field("url", &self.url)
            .field("device_id", &self.device_id)
            .field("device_type", &self.device_type)
            .field("pageview_count", &self.pageview_count)
            .field("visit_count", &self.visit_count)
            .field("days_installed", &self.days_installed)
            .field("launch_times", &self.launch_times)
            .field("device_data", &self.device_data)
            .field("geo", &self.geo)
            .field("client_key_present", &self.client_key_present)
            .field("previous_answers", &self.previous_answers)
            .field("elapsed_seconds", &self.elapsed_seconds)
            .field("scroll_percentage", &self.scroll_percentage)
            .field("exit_intent", &self.exit_intent)
            .field("mobile_view_name", &self.mobile_view_name)
            .field("fired_pseudo_event", &self.fired_pseudo_event)
            .field("dom_query", &self.dom_query.as_ref().map(|_| "<dyn DomQuery>"))
            .field("evaluated_at", &self.evaluated_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let ctx = VisitorContext::new()
            .with_device_data("plan", DeviceValue::from("gold"))
            .with_device_data("seats", DeviceValue::from(4))
            .with_previous_answer(SurveyId::new(1), PossibleAnswerId::new(7))
            .with_scroll_percentage(140);
        assert_eq!(ctx.device_data.as_ref().map(HashMap::len), Some(2));
        assert_eq!(
            ctx.previous_answers.as_ref().and_then(|m| m.get(&SurveyId::new(1))),
            Some(&PossibleAnswerId::new(7))
        );
        assert_eq!(ctx.scroll_percentage, Some(100));
    }

    #[test]
    fn test_stripped_url() {
        let ctx = VisitorContext::new().with_url("https://site.com/pricing");
        assert_eq!(ctx.stripped_url(), Some("site.com/pricing"));
        assert_eq!(VisitorContext::new().with_url("https://").stripped_url(), None);
        assert_eq!(VisitorContext::new().stripped_url(), None);
    }

    #[test]
    fn test_deserialize_from_json() {
        let ctx: VisitorContext = serde_json::from_str(
            r#"{"url":"http://a.com","device_id":"udid-9","device_type":"tablet",
                "device_data":{"plan":"gold"},"previous_answers":{"12":34},
                "geo":{"country":"US","state":"CA"}}"#,
        )
        .unwrap();
        assert_eq!(ctx.device_id, Some(DeviceId::new("udid-9")));
        assert_eq!(ctx.device_type, Some(DeviceType::Tablet));
        assert_eq!(
            ctx.previous_answers.unwrap().get(&SurveyId::new(12)),
            Some(&PossibleAnswerId::new(34))
        );
        assert_eq!(ctx.geo.unwrap().state.as_deref(), Some("CA"));
        assert!(ctx.dom_query.is_none());
    }

    #[test]
    fn test_closure_dom_query() {
        let query: Arc<dyn DomQuery> =
            Arc::new(|_: &str, probe: &DomProbe| -> Result<DomObservation, ExecutionError> {
                Ok(DomObservation::Found(matches!(probe, DomProbe::TagPresent)))
            });
        assert_eq!(
            query.query("a.com", &DomProbe::TagPresent).unwrap(),
            DomObservation::Found(true)
        );
        let debug = format!("{:?}", VisitorContext::new().with_dom_query(query));
        assert!(debug.contains("<dyn DomQuery>"));
    }
}
