//! Persisted trigger rows.
//!
//! Trigger configuration is stored as flat rows: a kind discriminator plus
//! one nullable column per kind-specific field. `TriggerRecord` mirrors that
//! shape for deserialization and is converted into a `Trigger` exactly once,
//! at load time. Fields belonging to another kind are rejected.

use serde::{Deserialize, Serialize};

use super::kinds::{DeviceDataMatcher, VisitorType, DEFAULT_REGEX_SIZE_LIMIT};
use super::Trigger;
use crate::error::ValidationError;
use crate::survey::{PossibleAnswerId, SurveyId, TriggerId};
use crate::value::DeviceValue;

/// Visitor type as persisted: either the integer code or the snake-case name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VisitorTypeField {
    Code(i64),
    Name(VisitorType),
}

/// A flat trigger row as stored by the configuration layer.
///
/// ```
/// use survey_targeting::{Trigger, TriggerRecord};
///
/// let record: TriggerRecord =
///     serde_json::from_str(r#"{"type":"UrlTrigger","url":"https://site.com/pricing"}"#).unwrap();
/// let trigger = Trigger::try_from(record).unwrap();
/// assert_eq!(trigger.kind().name(), "url_contains");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerRecord {
    pub id: Option<TriggerId>,
    #[serde(alias = "type", alias = "type_cd")]
    pub kind: String,
    pub excluded: bool,

    pub url: Option<String>,
    pub url_matches: Option<String>,
    pub regexp: Option<String>,

    pub device_data_key: Option<String>,
    pub device_data_matcher: Option<String>,
    pub device_data_value: Option<DeviceValue>,
    pub device_data_mandatory: Option<bool>,

    pub geo_country: Option<String>,
    pub geo_state_or_dma: Option<String>,

    pub pseudo_event: Option<String>,

    pub previous_answered_survey_id: Option<SurveyId>,
    pub previous_possible_answer_id: Option<PossibleAnswerId>,

    pub mobile_pageview: Option<String>,
    pub mobile_regexp: Option<String>,
    pub mobile_days_installed: Option<u32>,
    pub mobile_launch_times: Option<u32>,

    pub render_after_x_percent_scroll: Option<i64>,
    pub render_after_x_seconds: Option<u32>,
    pub render_after_element_visible: Option<String>,
    pub render_after_element_clicked: Option<String>,

    pub text_on_page_selector: Option<String>,
    pub text_on_page_value: Option<String>,
    pub text_on_page_presence: Option<bool>,

    pub client_key_presence: Option<bool>,

    pub visitor_type: Option<VisitorTypeField>,
    pub visits_count: Option<u32>,
    pub pageviews_count: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordKind {
    UrlContains,
    UrlEquals,
    RegexMatches,
    DeviceData,
    Geo,
    PseudoEvent,
    PreviousAnswer,
    MobilePageview,
    MobileRegexp,
    MobileInstall,
    MobileLaunch,
    PageScroll,
    PageAfterSeconds,
    PageIntentExit,
    PageElementVisible,
    PageElementClicked,
    TextOnPage,
    ClientKeyPresence,
    Visit,
    Pageview,
}

impl RecordKind {
    fn parse(raw: &str) -> Option<Self> {
        let kind = match raw.trim() {
            "url_contains" | "UrlTrigger" => Self::UrlContains,
            "url_equals" | "UrlMatchesTrigger" => Self::UrlEquals,
            "regex_matches" | "RegexpTrigger" => Self::RegexMatches,
            "device_data" | "DeviceDataTrigger" => Self::DeviceData,
            "geo" | "GeoTrigger" => Self::Geo,
            "pseudo_event" | "PseudoEventTrigger" => Self::PseudoEvent,
            "previous_answer" | "PreviousAnswerTrigger" => Self::PreviousAnswer,
            "mobile_pageview" | "MobilePageviewTrigger" => Self::MobilePageview,
            "mobile_regexp" | "MobileRegexpTrigger" => Self::MobileRegexp,
            "mobile_install" | "MobileInstallTrigger" => Self::MobileInstall,
            "mobile_launch" | "MobileLaunchTrigger" => Self::MobileLaunch,
            "page_scroll" | "PageScrollTrigger" => Self::PageScroll,
            "page_after_seconds" | "PageAfterSecondsTrigger" => Self::PageAfterSeconds,
            "page_intent_exit" | "PageIntentExitTrigger" => Self::PageIntentExit,
            "page_element_visible" | "PageElementVisibleTrigger" => Self::PageElementVisible,
            "page_element_clicked" | "PageElementClickedTrigger" => Self::PageElementClicked,
            "text_on_page" | "TextOnPageTrigger" => Self::TextOnPage,
            "client_key_presence" | "ClientKeyTrigger" => Self::ClientKeyPresence,
            "visit" | "VisitTrigger" => Self::Visit,
            "pageview" | "PageviewTrigger" => Self::Pageview,
            _ => return None,
        };
        Some(kind)
    }

    const fn name(self) -> &'static str {
        match self {
            Self::UrlContains => "url_contains",
            Self::UrlEquals => "url_equals",
            Self::RegexMatches => "regex_matches",
            Self::DeviceData => "device_data",
            Self::Geo => "geo",
            Self::PseudoEvent => "pseudo_event",
            Self::PreviousAnswer => "previous_answer",
            Self::MobilePageview => "mobile_pageview",
            Self::MobileRegexp => "mobile_regexp",
            Self::MobileInstall => "mobile_install",
            Self::MobileLaunch => "mobile_launch",
            Self::PageScroll => "page_scroll",
            Self::PageAfterSeconds => "page_after_seconds",
            Self::PageIntentExit => "page_intent_exit",
            Self::PageElementVisible => "page_element_visible",
            Self::PageElementClicked => "page_element_clicked",
            Self::TextOnPage => "text_on_page",
            Self::ClientKeyPresence => "client_key_presence",
            Self::Visit => "visit",
            Self::Pageview => "pageview",
        }
    }

    /// Columns this kind is allowed to populate.
    const fn fields(self) -> &'static [&'static str] {
        match self {
            Self::UrlContains => &["url"],
            Self::UrlEquals => &["url_matches"],
            Self::RegexMatches => &["regexp"],
            Self::DeviceData => &[
                "device_data_key",
                "device_data_matcher",
                "device_data_value",
                "device_data_mandatory",
            ],
            Self::Geo => &["geo_country", "geo_state_or_dma"],
            Self::PseudoEvent => &["pseudo_event"],
            Self::PreviousAnswer => &["previous_answered_survey_id", "previous_possible_answer_id"],
            Self::MobilePageview => &["mobile_pageview"],
            Self::MobileRegexp => &["mobile_regexp"],
            Self::MobileInstall => &["mobile_days_installed"],
            Self::MobileLaunch => &["mobile_launch_times"],
            Self::PageScroll => &["render_after_x_percent_scroll"],
            Self::PageAfterSeconds => &["render_after_x_seconds"],
            Self::PageIntentExit => &[],
            Self::PageElementVisible => &["render_after_element_visible"],
            Self::PageElementClicked => &["render_after_element_clicked"],
            Self::TextOnPage => &["text_on_page_selector", "text_on_page_value", "text_on_page_presence"],
            Self::ClientKeyPresence => &["client_key_presence"],
            Self::Visit => &["visitor_type", "visits_count"],
            Self::Pageview => &["pageviews_count"],
        }
    }
}

fn require<T>(value: Option<T>, kind: RecordKind, field: &'static str) -> Result<T, ValidationError> {
    value.ok_or(ValidationError::MissingField {
        kind: kind.name(),
        field,
    })
}

impl TriggerRecord {
    /// Names of every kind-specific column holding a non-default value.
    ///
    /// Rows share one table, so every row carries the column defaults
    /// (`false`, `0`, blank strings); those never count as populated.
    fn populated_fields(&self) -> Vec<&'static str> {
        fn text(value: Option<&String>) -> bool {
            value.is_some_and(|v| !v.trim().is_empty())
        }
        fn count(value: Option<u32>) -> bool {
            value.is_some_and(|v| v > 0)
        }

        let columns: [(&'static str, bool); 27] = [
            ("url", text(self.url.as_ref())),
            ("url_matches", text(self.url_matches.as_ref())),
            ("regexp", text(self.regexp.as_ref())),
            ("device_data_key", text(self.device_data_key.as_ref())),
            ("device_data_matcher", text(self.device_data_matcher.as_ref())),
            ("device_data_value", self.device_data_value.is_some()),
            ("device_data_mandatory", self.device_data_mandatory == Some(false)),
            ("geo_country", text(self.geo_country.as_ref())),
            ("geo_state_or_dma", text(self.geo_state_or_dma.as_ref())),
            ("pseudo_event", text(self.pseudo_event.as_ref())),
            ("previous_answered_survey_id", self.previous_answered_survey_id.is_some()),
            ("previous_possible_answer_id", self.previous_possible_answer_id.is_some()),
            ("mobile_pageview", text(self.mobile_pageview.as_ref())),
            ("mobile_regexp", text(self.mobile_regexp.as_ref())),
            ("mobile_days_installed", count(self.mobile_days_installed)),
            ("mobile_launch_times", count(self.mobile_launch_times)),
            ("render_after_x_percent_scroll", self.render_after_x_percent_scroll.is_some_and(|v| v != 0)),
            ("render_after_x_seconds", count(self.render_after_x_seconds)),
            ("render_after_element_visible", text(self.render_after_element_visible.as_ref())),
            ("render_after_element_clicked", text(self.render_after_element_clicked.as_ref())),
            ("text_on_page_selector", text(self.text_on_page_selector.as_ref())),
            ("text_on_page_value", text(self.text_on_page_value.as_ref())),
            ("text_on_page_presence", self.text_on_page_presence == Some(true)),
            ("client_key_presence", self.client_key_presence == Some(true)),
            (
                "visitor_type",
                !matches!(
                    self.visitor_type,
                    None | Some(VisitorTypeField::Code(0) | VisitorTypeField::Name(VisitorType::All))
                ),
            ),
            ("visits_count", count(self.visits_count)),
            ("pageviews_count", count(self.pageviews_count)),
        ];
        columns
            .into_iter()
            .filter(|(_, set)| *set)
            .map(|(name, _)| name)
            .collect()
    }

    /// Validates and converts this row, compiling regexes under `size_limit`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnknownTriggerKind` for an unrecognized kind,
    /// `UnexpectedField` when a column of another kind is populated, and the
    /// per-kind constructor errors otherwise.
    pub fn compile(self, size_limit: usize) -> Result<Trigger, ValidationError> {
        let kind = RecordKind::parse(&self.kind).ok_or_else(|| ValidationError::UnknownTriggerKind {
            kind: self.kind.clone(),
        })?;

        let allowed = kind.fields();
        if let Some(field) = self
            .populated_fields()
            .into_iter()
            .find(|field| !allowed.contains(field))
        {
            return Err(ValidationError::UnexpectedField {
                kind: kind.name(),
                field,
            });
        }

        let trigger = match kind {
            RecordKind::UrlContains => Trigger::url_contains(&require(self.url, kind, "url")?)?,
            RecordKind::UrlEquals => Trigger::url_equals(&require(self.url_matches, kind, "url_matches")?)?,
            RecordKind::RegexMatches => {
                Trigger::regex_matches_with_limit(&require(self.regexp, kind, "regexp")?, size_limit)?
            }
            RecordKind::DeviceData => {
                let key = require(self.device_data_key, kind, "device_data_key")?;
                let matcher: DeviceDataMatcher =
                    require(self.device_data_matcher, kind, "device_data_matcher")?.parse()?;
                let value = self.device_data_value.map(|v| v.as_text());
                let trigger = Trigger::device_data(&key, matcher, value.as_deref())?;
                if self.device_data_mandatory.unwrap_or(true) {
                    trigger
                } else {
                    trigger.optional()
                }
            }
            RecordKind::Geo => Trigger::geo(
                &require(self.geo_country, kind, "geo_country")?,
                self.geo_state_or_dma.as_deref(),
            )?,
            RecordKind::PseudoEvent => Trigger::pseudo_event(&require(self.pseudo_event, kind, "pseudo_event")?)?,
            RecordKind::PreviousAnswer => Trigger::previous_answer(
                require(self.previous_answered_survey_id, kind, "previous_answered_survey_id")?,
                require(self.previous_possible_answer_id, kind, "previous_possible_answer_id")?,
            ),
            RecordKind::MobilePageview => {
                Trigger::mobile_pageview(&require(self.mobile_pageview, kind, "mobile_pageview")?)?
            }
            RecordKind::MobileRegexp => {
                Trigger::mobile_regexp_with_limit(&require(self.mobile_regexp, kind, "mobile_regexp")?, size_limit)?
            }
            RecordKind::MobileInstall => {
                Trigger::mobile_install(require(self.mobile_days_installed, kind, "mobile_days_installed")?)
            }
            RecordKind::MobileLaunch => {
                Trigger::mobile_launch(require(self.mobile_launch_times, kind, "mobile_launch_times")?)
            }
            RecordKind::PageScroll => {
                let percent = require(
                    self.render_after_x_percent_scroll,
                    kind,
                    "render_after_x_percent_scroll",
                )?;
                let percent = u8::try_from(percent).map_err(|_| ValidationError::OutOfRange {
                    field: "render_after_x_percent_scroll",
                    value: percent,
                    min: 0,
                    max: 100,
                })?;
                Trigger::page_scroll(percent)?
            }
            RecordKind::PageAfterSeconds => {
                Trigger::page_after_seconds(require(self.render_after_x_seconds, kind, "render_after_x_seconds")?)
            }
            RecordKind::PageIntentExit => Trigger::page_intent_exit(),
            RecordKind::PageElementVisible => Trigger::page_element_visible(&require(
                self.render_after_element_visible,
                kind,
                "render_after_element_visible",
            )?)?,
            RecordKind::PageElementClicked => Trigger::page_element_clicked(&require(
                self.render_after_element_clicked,
                kind,
                "render_after_element_clicked",
            )?)?,
            RecordKind::TextOnPage => Trigger::text_on_page(
                &require(self.text_on_page_selector, kind, "text_on_page_selector")?,
                &require(self.text_on_page_value, kind, "text_on_page_value")?,
                self.text_on_page_presence.unwrap_or(true),
            )?,
            RecordKind::ClientKeyPresence => {
                Trigger::client_key_presence(require(self.client_key_presence, kind, "client_key_presence")?)
            }
            RecordKind::Visit => {
                let visitor_type = match self.visitor_type {
                    None => VisitorType::All,
                    Some(VisitorTypeField::Code(code)) => VisitorType::from_code(code)?,
                    Some(VisitorTypeField::Name(name)) => name,
                };
                let visits_count = if visitor_type == VisitorType::Returning {
                    require(self.visits_count, kind, "visits_count")?
                } else {
                    self.visits_count.unwrap_or(0)
                };
                Trigger::visit(visitor_type, visits_count)
            }
            RecordKind::Pageview => Trigger::pageview(require(self.pageviews_count, kind, "pageviews_count")?),
        };

        let trigger = trigger.with_excluded(self.excluded);
        Ok(match self.id {
            Some(id) => trigger.with_id(id),
            None => trigger,
        })
    }
}

impl TryFrom<TriggerRecord> for Trigger {
    type Error = ValidationError;

    fn try_from(record: TriggerRecord) -> Result<Self, Self::Error> {
        record.compile(DEFAULT_REGEX_SIZE_LIMIT)
    }
}
