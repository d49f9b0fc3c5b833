//! Frequency cap state machine.
//!
//! `BelowCap` until `limit` impressions fall inside the counting window,
//! then `AtCap` until enough of them age out. Without a window the cap
//! counts lifetime impressions and `AtCap` is permanent.

use chrono::{DateTime, Utc};

use crate::survey::FrequencyCapConfig;

/// Cap state for one (device, survey) or (device, account) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyCapState {
    BelowCap,
    /// `until` is the instant the state decays; None means never.
    AtCap { until: Option<DateTime<Utc>> },
}

impl FrequencyCapState {
    /// Computes the state from impression timestamps sorted oldest first.
    ///
    /// `lifetime_count` is used for caps without a window, where the
    /// timestamp list may have been pruned.
    #[must_use]
    pub fn compute(
        config: &FrequencyCapConfig,
        impressions: &[DateTime<Utc>],
        lifetime_count: u64,
        now: DateTime<Utc>,
    ) -> Self {
        if !config.enabled || config.limit == 0 {
            return Self::BelowCap;
        }
        let limit = u64::from(config.limit);

        let Some(window) = config.duration.map(|d| d.to_duration()) else {
            let counted = lifetime_count.max(impressions.len() as u64);
            return if counted >= limit {
                Self::AtCap { until: None }
            } else {
                Self::BelowCap
            };
        };

        // A window reaching before the representable range covers all time.
        let first = now
            .checked_sub_signed(window)
            .map_or(0, |cutoff| impressions.partition_point(|t| *t <= cutoff));
        let in_window = &impressions[first..];
        let count = in_window.len() as u64;
        if count < limit {
            return Self::BelowCap;
        }
        // Decays once all but `limit - 1` of the counted impressions have left the window.
        let excess = (count - limit) as usize;
        Self::AtCap {
            until: in_window[excess].checked_add_signed(window),
        }
    }

    #[must_use]
    pub const fn is_below_cap(&self) -> bool {
        matches!(self, Self::BelowCap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::CapScope;
    use crate::time::Interval;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn daily_cap(limit: u32) -> FrequencyCapConfig {
        FrequencyCapConfig::new(limit, Some(Interval::hours(24)), CapScope::PerSurvey).unwrap()
    }

    #[test]
    fn test_disabled_is_always_below() {
        let impressions = vec![t0(); 50];
        let state = FrequencyCapState::compute(&FrequencyCapConfig::disabled(), &impressions, 50, t0());
        assert!(state.is_below_cap());
    }

    #[test]
    fn test_three_per_day_reaches_cap_and_decays() {
        let cap = daily_cap(3);
        let impressions = vec![t0(), t0() + Duration::hours(1), t0() + Duration::hours(2)];

        let two = FrequencyCapState::compute(&cap, &impressions[..2], 2, t0() + Duration::hours(2));
        assert!(two.is_below_cap());

        let at = FrequencyCapState::compute(&cap, &impressions, 3, t0() + Duration::hours(3));
        assert_eq!(
            at,
            FrequencyCapState::AtCap {
                until: Some(t0() + Duration::hours(24))
            }
        );

        let still = FrequencyCapState::compute(&cap, &impressions, 3, t0() + Duration::hours(23));
        assert!(!still.is_below_cap());

        let decayed = FrequencyCapState::compute(&cap, &impressions, 3, t0() + Duration::hours(24));
        assert!(decayed.is_below_cap());
    }

    #[test]
    fn test_excess_impressions_delay_decay() {
        let cap = daily_cap(2);
        let impressions = vec![t0(), t0() + Duration::hours(1), t0() + Duration::hours(2)];
        let state = FrequencyCapState::compute(&cap, &impressions, 3, t0() + Duration::hours(3));
        assert_eq!(
            state,
            FrequencyCapState::AtCap {
                until: Some(t0() + Duration::hours(25))
            }
        );
    }

    #[test]
    fn test_unrepresentable_window_counts_every_impression() {
        let cap = FrequencyCapConfig {
            enabled: true,
            limit: 1,
            duration: Some(Interval::days(u32::MAX)),
            scope: CapScope::PerSurvey,
        };
        let state = FrequencyCapState::compute(&cap, &[t0()], 1, t0() + Duration::hours(1));
        assert_eq!(state, FrequencyCapState::AtCap { until: None });
    }

    #[test]
    fn test_lifetime_cap_uses_lifetime_count() {
        let cap = FrequencyCapConfig::new(2, None, CapScope::PerSurvey).unwrap();
        let state = FrequencyCapState::compute(&cap, &[], 2, t0());
        assert_eq!(state, FrequencyCapState::AtCap { until: None });
        assert!(FrequencyCapState::compute(&cap, &[t0()], 1, t0()).is_below_cap());
    }
}
