//! Trigger kind definitions.
//!
//! Each variant carries only the fields its predicate needs. Values are
//! normalized and validated by the constructors in `trigger/mod.rs` and by
//! `TriggerRecord` conversion, so evaluation never sees a malformed trigger.

use std::fmt;
use std::str::FromStr;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::survey::{PossibleAnswerId, SurveyId};

/// Default compiled-size limit for trigger regexes.
pub const DEFAULT_REGEX_SIZE_LIMIT: usize = 1 << 20;

/// A compiled, case-insensitive pattern.
///
/// Two patterns are equal when their source text is equal.
#[derive(Debug, Clone)]
pub struct TriggerPattern {
    source: String,
    regex: Regex,
}

impl TriggerPattern {
    /// Compiles `source` with the given compiled-size limit.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidRegex` if the pattern is empty, does not
    /// parse, or exceeds `size_limit`.
    pub fn compile(source: &str, size_limit: usize) -> Result<Self, ValidationError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(ValidationError::InvalidRegex {
                pattern: String::new(),
                reason: "pattern is empty".to_string(),
            });
        }
        let regex = RegexBuilder::new(source)
            .case_insensitive(true)
            .size_limit(size_limit)
            .build()
            .map_err(|e| ValidationError::InvalidRegex {
                pattern: source.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack)
    }
}

impl PartialEq for TriggerPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for TriggerPattern {}

impl fmt::Display for TriggerPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Comparison applied by a `DeviceData` trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceDataMatcher {
    Is,
    IsNot,
    Contains,
    DoesNotContain,
    IsTrue,
    IsNotTrue,
    IsMoreThan,
    IsEqualOrMoreThan,
    IsEqualOrLessThan,
    IsLessThan,
}

impl DeviceDataMatcher {
    /// All matchers, in admin-UI order.
    pub const ALL: [Self; 10] = [
        Self::Is,
        Self::IsNot,
        Self::Contains,
        Self::DoesNotContain,
        Self::IsTrue,
        Self::IsNotTrue,
        Self::IsMoreThan,
        Self::IsEqualOrMoreThan,
        Self::IsEqualOrLessThan,
        Self::IsLessThan,
    ];

    /// Wire name of the matcher.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Is => "is",
            Self::IsNot => "is_not",
            Self::Contains => "contains",
            Self::DoesNotContain => "does_not_contain",
            Self::IsTrue => "is_true",
            Self::IsNotTrue => "is_not_true",
            Self::IsMoreThan => "is_more_than",
            Self::IsEqualOrMoreThan => "is_equal_or_more_than",
            Self::IsEqualOrLessThan => "is_equal_or_less_than",
            Self::IsLessThan => "is_less_than",
        }
    }

    /// `is_true` and `is_not_true` take no comparison value.
    #[must_use]
    pub const fn takes_value(self) -> bool {
        !matches!(self, Self::IsTrue | Self::IsNotTrue)
    }

    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::IsMoreThan | Self::IsEqualOrMoreThan | Self::IsEqualOrLessThan | Self::IsLessThan
        )
    }
}

impl fmt::Display for DeviceDataMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceDataMatcher {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s.trim())
            .ok_or_else(|| ValidationError::InvalidConfig {
                reason: format!("unknown device data matcher '{s}'"),
            })
    }
}

/// Which visitors a `Visit` trigger admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitorType {
    #[default]
    All,
    /// First visit only.
    New,
    /// At least `visits_count` visits.
    Returning,
}

impl VisitorType {
    /// Maps the persisted integer code (0 all, 1 new, 2 returning).
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::OutOfRange` for any other code.
    pub fn from_code(code: i64) -> Result<Self, ValidationError> {
        match code {
            0 => Ok(Self::All),
            1 => Ok(Self::New),
            2 => Ok(Self::Returning),
            other => Err(ValidationError::OutOfRange {
                field: "visitor_type",
                value: other,
                min: 0,
                max: 2,
            }),
        }
    }
}

impl fmt::Display for VisitorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::All => "all visitors",
            Self::New => "new visitors",
            Self::Returning => "returning visitors",
        };
        f.write_str(s)
    }
}

/// The closed set of trigger kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerKind {
    /// Visitor URL contains `url` (scheme stripped).
    UrlContains { url: String },
    /// Visitor URL equals `url` (scheme and trailing slash stripped).
    UrlEquals { url: String },
    /// Pattern matches the visitor URL (scheme stripped).
    RegexMatches { pattern: TriggerPattern },
    DeviceData {
        key: String,
        matcher: DeviceDataMatcher,
        value: Option<String>,
        /// Optional device-data triggers pass as a group if any one passes.
        mandatory: bool,
    },
    Geo {
        country: String,
        state_or_dma: Option<String>,
    },
    PseudoEvent { event: String },
    PreviousAnswer {
        survey_id: SurveyId,
        possible_answer_id: PossibleAnswerId,
    },
    /// Mobile view name contains `view_name`.
    MobilePageview { view_name: String },
    MobileRegexp { pattern: TriggerPattern },
    MobileInstall { days_installed: u32 },
    MobileLaunch { launch_times: u32 },
    PageScroll { percent: u8 },
    PageAfterSeconds { seconds: u32 },
    PageIntentExit,
    PageElementVisible { selector: String },
    PageElementClicked { selector: String },
    TextOnPage {
        selector: String,
        text: String,
        /// False means the text must be absent.
        presence: bool,
    },
    ClientKeyPresence { present: bool },
    Visit {
        visitor_type: VisitorType,
        visits_count: u32,
    },
    Pageview { pageviews_count: u32 },
}

impl TriggerKind {
    /// Snake-case kind name, as used in `TriggerRecord::kind`.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::UrlContains { .. } => "url_contains",
            Self::UrlEquals { .. } => "url_equals",
            Self::RegexMatches { .. } => "regex_matches",
            Self::DeviceData { .. } => "device_data",
            Self::Geo { .. } => "geo",
            Self::PseudoEvent { .. } => "pseudo_event",
            Self::PreviousAnswer { .. } => "previous_answer",
            Self::MobilePageview { .. } => "mobile_pageview",
            Self::MobileRegexp { .. } => "mobile_regexp",
            Self::MobileInstall { .. } => "mobile_install",
            Self::MobileLaunch { .. } => "mobile_launch",
            Self::PageScroll { .. } => "page_scroll",
            Self::PageAfterSeconds { .. } => "page_after_seconds",
            Self::PageIntentExit => "page_intent_exit",
            Self::PageElementVisible { .. } => "page_element_visible",
            Self::PageElementClicked { .. } => "page_element_clicked",
            Self::TextOnPage { .. } => "text_on_page",
            Self::ClientKeyPresence { .. } => "client_key_presence",
            Self::Visit { .. } => "visit",
            Self::Pageview { .. } => "pageview",
        }
    }

    /// Kinds that can only be decided against a live page.
    #[must_use]
    pub const fn is_dom_dependent(&self) -> bool {
        matches!(
            self,
            Self::PageElementVisible { .. } | Self::PageElementClicked { .. } | Self::TextOnPage { .. }
        )
    }

    /// Kinds compared against the visitor URL.
    #[must_use]
    pub const fn is_url_based(&self) -> bool {
        matches!(
            self,
            Self::UrlContains { .. } | Self::UrlEquals { .. } | Self::RegexMatches { .. }
        )
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UrlContains { url } => write!(f, "URL contains target ({url})"),
            Self::UrlEquals { url } => write!(f, "URL same as target ({url})"),
            Self::RegexMatches { pattern } => write!(f, "URL matches regular expression ({pattern})"),
            Self::DeviceData {
                key, matcher, value, ..
            } => match value {
                Some(v) => write!(f, "Device data key '{key}' {matcher} '{v}'"),
                None => write!(f, "Device data key '{key}' {matcher}"),
            },
            Self::Geo {
                country,
                state_or_dma,
            } => match state_or_dma {
                Some(region) => write!(f, "Visitor located in {country} {region}"),
                None => write!(f, "Visitor located in {country}"),
            },
            Self::PseudoEvent { event } => write!(f, "Present alias (pseudo event) {event} fired"),
            Self::PreviousAnswer {
                survey_id,
                possible_answer_id,
            } => write!(f, "Answered possible answer {possible_answer_id} on survey {survey_id}"),
            Self::MobilePageview { view_name } => write!(f, "Mobile view name contains {view_name}"),
            Self::MobileRegexp { pattern } => write!(f, "Mobile view name matches ({pattern})"),
            Self::MobileInstall { days_installed } => {
                write!(f, "App installed for at least {days_installed} days")
            }
            Self::MobileLaunch { launch_times } => write!(f, "App launched at least {launch_times} times"),
            Self::PageScroll { percent } => write!(f, "Scrolled {percent}% of page"),
            Self::PageAfterSeconds { seconds } => write!(f, "On page for {seconds} seconds"),
            Self::PageIntentExit => write!(f, "Exit intent detected"),
            Self::PageElementVisible { selector } => write!(f, "Page element visible ({selector})"),
            Self::PageElementClicked { selector } => write!(f, "Page element clicked ({selector})"),
            Self::TextOnPage {
                selector,
                text,
                presence,
            } => {
                let verb = if *presence { "contains" } else { "does not contain" };
                write!(f, "Element {selector} {verb} text '{text}'")
            }
            Self::ClientKeyPresence { present } => {
                if *present {
                    write!(f, "Client key present")
                } else {
                    write!(f, "Client key absent")
                }
            }
            Self::Visit {
                visitor_type,
                visits_count,
            } => match visitor_type {
                VisitorType::Returning => write!(f, "Returning visitor with at least {visits_count} visits"),
                other => write!(f, "Visit from {other}"),
            },
            Self::Pageview { pageviews_count } => write!(f, "At least {pageviews_count} pageviews"),
        }
    }
}
