//! Refire state machine.

use chrono::{DateTime, Utc};

use crate::history::DeviceHistory;
use crate::survey::Survey;

/// Refire eligibility of one device for one survey.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefireState {
    /// No completed submission recorded.
    NeverShown,
    AwaitingRefire { eligible_at: DateTime<Utc> },
    Eligible,
    /// Completed with refire disabled; terminal.
    Suppressed,
}

impl RefireState {
    #[must_use]
    pub fn compute(survey: &Survey, history: Option<&DeviceHistory>, now: DateTime<Utc>) -> Self {
        let Some(completed_at) = history.and_then(|h| h.last_completed_at) else {
            return Self::NeverShown;
        };
        if !survey.refire_enabled {
            return Self::Suppressed;
        }
        let Some(interval) = survey.refire_interval else {
            return Self::Eligible;
        };
        // Past the representable range the survey never refires.
        let Some(eligible_at) = completed_at.checked_add_signed(interval.to_duration()) else {
            return Self::AwaitingRefire {
                eligible_at: DateTime::<Utc>::MAX_UTC,
            };
        };
        if now >= eligible_at {
            Self::Eligible
        } else {
            Self::AwaitingRefire { eligible_at }
        }
    }

    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        matches!(self, Self::NeverShown | Self::Eligible)
    }
}
