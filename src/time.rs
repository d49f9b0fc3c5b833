//! Temporal types for survey scheduling and counting windows.
//!
//! - **Schedule**: the window in which a survey may render at all.
//! - **Interval**: a span expressed in minutes, hours, or days, used by
//!   frequency-cap windows and refire periods.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A survey schedule: closed interval `[starts_at, ends_at]`.
///
/// Either bound may be absent, in which case that side is unbounded.
///
/// # Examples
///
/// ```
/// use survey_targeting::Schedule;
/// use chrono::Utc;
///
/// let schedule = Schedule::unbounded();
/// assert!(schedule.is_unbounded());
/// assert!(schedule.contains(Utc::now()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Schedule {
    /// First instant the survey may render (inclusive). None means no start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,

    /// Last instant the survey may render (inclusive). None means no end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
}

impl Schedule {
    /// Creates a schedule from optional bounds.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidSchedule` if both bounds are set and
    /// `starts_at > ends_at`.
    pub fn new(
        starts_at: Option<DateTime<Utc>>,
        ends_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ValidationError> {
        if let (Some(start), Some(end)) = (starts_at, ends_at) {
            if start > end {
                return Err(ValidationError::InvalidSchedule {
                    starts_at: start,
                    ends_at: end,
                });
            }
        }
        Ok(Self { starts_at, ends_at })
    }

    /// A schedule with no bounds.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            starts_at: None,
            ends_at: None,
        }
    }

    /// Open-ended schedule beginning at `from`.
    #[must_use]
    pub const fn starting_at(from: DateTime<Utc>) -> Self {
        Self {
            starts_at: Some(from),
            ends_at: None,
        }
    }

    /// Schedule ending at `until` with no start bound.
    #[must_use]
    pub const fn ending_at(until: DateTime<Utc>) -> Self {
        Self {
            starts_at: None,
            ends_at: Some(until),
        }
    }

    pub const fn is_unbounded(&self) -> bool {
        self.starts_at.is_none() && self.ends_at.is_none()
    }

    /// Check if a timestamp falls within `[starts_at, ends_at]`.
    #[must_use]
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.starts_at.map_or(true, |start| time >= start)
            && self.ends_at.map_or(true, |end| time <= end)
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let start = self
            .starts_at
            .map_or_else(|| "-∞".to_string(), |s| s.to_rfc3339());
        let end = self
            .ends_at
            .map_or_else(|| "∞".to_string(), |e| e.to_rfc3339());
        write!(f, "[{start} → {end}]")
    }
}

/// Unit of an `Interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Singular name, as used in summaries.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Minutes => "minute",
            Self::Hours => "hour",
            Self::Days => "day",
        }
    }

    const fn max_amount(self) -> u32 {
        match self {
            Self::Minutes => Interval::MAX_DAYS * 24 * 60,
            Self::Hours => Interval::MAX_DAYS * 24,
            Self::Days => Interval::MAX_DAYS,
        }
    }
}

/// A positive span of time in whole minutes, hours, or days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub amount: u32,
    pub unit: TimeUnit,
}

impl Interval {
    /// Longest accepted span, in days.
    pub const MAX_DAYS: u32 = 36_500;

    /// Creates an interval.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::OutOfRange` if `amount` is zero or the span
    /// exceeds `MAX_DAYS`.
    pub fn new(amount: u32, unit: TimeUnit) -> Result<Self, ValidationError> {
        let interval = Self { amount, unit };
        interval.validate()?;
        Ok(interval)
    }

    /// Checks that the amount is positive and the span at most `MAX_DAYS`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::OutOfRange` naming the allowed amounts for
    /// this unit.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let max = self.unit.max_amount();
        if self.amount == 0 || self.amount > max {
            return Err(ValidationError::OutOfRange {
                field: "interval.amount",
                value: i64::from(self.amount),
                min: 1,
                max: i64::from(max),
            });
        }
        Ok(())
    }

    #[must_use]
    pub const fn minutes(amount: u32) -> Self {
        Self {
            amount,
            unit: TimeUnit::Minutes,
        }
    }

    #[must_use]
    pub const fn hours(amount: u32) -> Self {
        Self {
            amount,
            unit: TimeUnit::Hours,
        }
    }

    #[must_use]
    pub const fn days(amount: u32) -> Self {
        Self {
            amount,
            unit: TimeUnit::Days,
        }
    }

    /// Converts to a chrono duration.
    #[must_use]
    pub fn to_duration(self) -> Duration {
        let amount = i64::from(self.amount);
        match self.unit {
            TimeUnit::Minutes => Duration::minutes(amount),
            TimeUnit::Hours => Duration::hours(amount),
            TimeUnit::Days => Duration::days(amount),
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let plural = if self.amount == 1 { "" } else { "s" };
        write!(f, "{} {}{plural}", self.amount, self.unit.name())
    }
}
