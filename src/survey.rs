//! Survey targeting subject and its identifiers.
//!
//! A `Survey` is read-only to the engine: status, schedule, goal, and the
//! frequency-cap and refire configuration are owned by the admin layer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::time::{Interval, Schedule};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Wraps a raw database id.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the raw id.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a survey.
    SurveyId
);
numeric_id!(
    /// Identifier of the account owning surveys.
    AccountId
);
numeric_id!(
    /// Identifier of a selectable answer option.
    PossibleAnswerId
);
numeric_id!(
    /// Identifier of a persisted trigger row.
    TriggerId
);

/// Identifier of a visitor device (the tag's udid).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    #[must_use]
    pub fn new(udid: impl Into<String>) -> Self {
        Self(udid.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(udid: &str) -> Self {
        Self::new(udid)
    }
}

/// Lifecycle status, set externally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyStatus {
    Draft,
    Live,
    Paused,
    Complete,
    Expired,
    Archived,
}

impl fmt::Display for SurveyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Live => "live",
            Self::Paused => "paused",
            Self::Complete => "complete",
            Self::Expired => "expired",
            Self::Archived => "archived",
        };
        f.write_str(s)
    }
}

/// What a frequency cap counts impressions against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapScope {
    /// Impressions of this survey only.
    #[default]
    PerSurvey,
    /// Impressions of every survey in the owning account.
    PerAccount,
}

/// Frequency-cap configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrequencyCapConfig {
    pub enabled: bool,
    pub limit: u32,
    /// Counting window. None counts every impression ever recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Interval>,
    #[serde(default)]
    pub scope: CapScope,
}

impl FrequencyCapConfig {
    /// An enabled cap of `limit` impressions per `duration`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::OutOfRange` if `limit` is zero or the
    /// window is out of range.
    pub fn new(limit: u32, duration: Option<Interval>, scope: CapScope) -> Result<Self, ValidationError> {
        if let Some(window) = &duration {
            window.validate()?;
        }
        if limit == 0 {
            return Err(ValidationError::OutOfRange {
                field: "frequency_cap.limit",
                value: 0,
                min: 1,
                max: i64::from(u32::MAX),
            });
        }
        Ok(Self {
            enabled: true,
            limit,
            duration,
            scope,
        })
    }

    /// A cap that never limits.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            limit: 0,
            duration: None,
            scope: CapScope::PerSurvey,
        }
    }
}

impl Default for FrequencyCapConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Device classes a survey can be enabled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    NativeMobile,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
            Self::NativeMobile => "native_mobile",
        };
        f.write_str(s)
    }
}

/// Per-device-class enablement flags.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceTargeting {
    pub desktop: bool,
    pub mobile: bool,
    pub tablet: bool,
    pub native_mobile: bool,
}

impl DeviceTargeting {
    /// Every device class enabled.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            desktop: true,
            mobile: true,
            tablet: true,
            native_mobile: true,
        }
    }

    #[must_use]
    pub const fn allows(&self, device_type: DeviceType) -> bool {
        match device_type {
            DeviceType::Desktop => self.desktop,
            DeviceType::Mobile => self.mobile,
            DeviceType::Tablet => self.tablet,
            DeviceType::NativeMobile => self.native_mobile,
        }
    }
}

impl Default for DeviceTargeting {
    fn default() -> Self {
        Self::all()
    }
}

/// A survey as seen by the targeting engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Survey {
    pub id: SurveyId,
    pub account_id: AccountId,
    pub name: String,
    pub status: SurveyStatus,
    #[serde(default)]
    pub schedule: Schedule,
    /// Submission count at which the survey stops rendering.
    pub goal: u64,
    #[serde(default)]
    pub frequency_cap: FrequencyCapConfig,
    /// Bypass the account frequency cap for this survey.
    #[serde(default)]
    pub ignore_frequency_cap: bool,
    #[serde(default)]
    pub refire_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refire_interval: Option<Interval>,
    #[serde(default)]
    pub device_targeting: DeviceTargeting,
    /// Suppress for devices that closed the survey without answering.
    #[serde(default)]
    pub stop_showing_without_answer: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_target_selector: Option<String>,
}

impl Survey {
    /// Default submission goal for new surveys.
    pub const DEFAULT_GOAL: u64 = 5000;

    /// Creates a draft survey with no schedule, default goal, no cap, and no refire.
    #[must_use]
    pub fn new(id: SurveyId, account_id: AccountId, name: impl Into<String>) -> Self {
        Self {
            id,
            account_id,
            name: name.into(),
            status: SurveyStatus::Draft,
            schedule: Schedule::unbounded(),
            goal: Self::DEFAULT_GOAL,
            frequency_cap: FrequencyCapConfig::disabled(),
            ignore_frequency_cap: false,
            refire_enabled: false,
            refire_interval: None,
            device_targeting: DeviceTargeting::all(),
            stop_showing_without_answer: false,
            inline_target_selector: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: SurveyStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    #[must_use]
    pub fn with_goal(mut self, goal: u64) -> Self {
        self.goal = goal;
        self
    }

    #[must_use]
    pub fn with_frequency_cap(mut self, cap: FrequencyCapConfig) -> Self {
        self.frequency_cap = cap;
        self
    }

    #[must_use]
    pub fn ignoring_frequency_cap(mut self) -> Self {
        self.ignore_frequency_cap = true;
        self
    }

    /// Enables refire after `interval` has elapsed since the last completion.
    #[must_use]
    pub fn with_refire(mut self, interval: Interval) -> Self {
        self.refire_enabled = true;
        self.refire_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn with_device_targeting(mut self, targeting: DeviceTargeting) -> Self {
        self.device_targeting = targeting;
        self
    }

    #[must_use]
    pub fn stop_showing_without_answer(mut self) -> Self {
        self.stop_showing_without_answer = true;
        self
    }

    #[must_use]
    pub fn with_inline_target(mut self, selector: impl Into<String>) -> Self {
        self.inline_target_selector = Some(selector.into());
        self
    }

    /// Checks the cross-field invariants of a deserialized survey.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` when refire is enabled without an interval,
    /// an enabled cap has a zero limit, or the schedule is inverted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.refire_enabled && self.refire_interval.is_none() {
            return Err(ValidationError::MissingField {
                kind: "survey",
                field: "refire_interval",
            });
        }
        if self.frequency_cap.enabled && self.frequency_cap.limit == 0 {
            return Err(ValidationError::OutOfRange {
                field: "frequency_cap.limit",
                value: 0,
                min: 1,
                max: i64::from(u32::MAX),
            });
        }
        if let Some(interval) = &self.refire_interval {
            interval.validate()?;
        }
        if let Some(window) = &self.frequency_cap.duration {
            window.validate()?;
        }
        Schedule::new(self.schedule.starts_at, self.schedule.ends_at)?;
        Ok(())
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.status == SurveyStatus::Live
    }

    /// True when the cap applies to this survey at all.
    #[must_use]
    pub const fn frequency_cap_active(&self) -> bool {
        self.frequency_cap.enabled && !self.ignore_frequency_cap
    }

    /// True once `submissions` has reached the goal.
    #[must_use]
    pub const fn goal_reached(&self, submissions: u64) -> bool {
        submissions >= self.goal
    }
}
