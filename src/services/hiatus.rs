//! Hiatus periods on a member profile.
//!
//! A hiatus may be bounded by `min_hiatus_days` / `max_hiatus_days` and the
//! number of starts inside a rolling window by
//! `max_hiatus_uses_per_semester`. Settings of zero or less are unbounded.

use chrono::{DateTime, Months, Utc};
use thiserror::Error;

use crate::database::models::TeamMemberProfile;
use crate::services::settings::{TeamSettingsSnapshot, keys};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HiatusLimits {
    pub min_days: i64,
    pub max_days: i64,
    pub max_uses: i64,
}

impl HiatusLimits {
    pub fn from_settings(settings: &TeamSettingsSnapshot) -> Self {
        Self {
            min_days: settings.get_int(keys::MIN_HIATUS_DAYS),
            max_days: settings.get_int(keys::MAX_HIATUS_DAYS),
            max_uses: settings.get_int(keys::MAX_HIATUS_USES_PER_SEMESTER),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HiatusRejection {
    #[error("Hiatus period is outside the allowed length")]
    InvalidPeriod,
    #[error("Hiatus limit reached ({used} of {limit} in the current window)")]
    UsesExhausted { used: i32, limit: i64 },
    #[error("Member is not on hiatus")]
    NotOnHiatus,
}

/// Whether `start..end` is an acceptable hiatus length, counted in whole days.
///
/// An open-ended hiatus is only acceptable while neither bound is configured.
pub fn validate_period(
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    min_days: i64,
    max_days: i64,
) -> bool {
    let Some(end) = end else {
        return min_days <= 0 && max_days <= 0;
    };
    if end < start {
        return false;
    }

    let days = (end - start).num_days();
    (min_days <= 0 || days >= min_days) && (max_days <= 0 || days <= max_days)
}

/// Earliest start that still counts toward the current window.
pub fn window_start(now: DateTime<Utc>, window_months: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(window_months))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Zeroes the rolling counter once the last start has left the window.
pub fn reset_lapsed_window(profile: &mut TeamMemberProfile, now: DateTime<Utc>, window_months: u32) {
    let lapsed = profile
        .last_hiatus_started_at
        .is_some_and(|last| last < window_start(now, window_months));
    if lapsed && profile.hiatus_count != 0 {
        log::debug!(
            "Resetting hiatus counter of member {} (was {})",
            profile.member_id,
            profile.hiatus_count
        );
        profile.hiatus_count = 0;
    }
}

/// Ends a hiatus whose end date has already passed.
pub fn close_lapsed(profile: &mut TeamMemberProfile, now: DateTime<Utc>) {
    let lapsed = profile.is_on_hiatus && profile.hiatus_ends_at.is_some_and(|ends_at| ends_at <= now);
    if lapsed {
        log::debug!("Hiatus of member {} ran out, closing it", profile.member_id);
        end(profile);
    }
}

/// Starts a hiatus at `now`. The profile is left untouched on rejection.
///
/// Every start counts against the rolling limit, including one requested
/// while a hiatus is still running; that hiatus keeps its original start.
pub fn start(
    profile: &mut TeamMemberProfile,
    ends_at: Option<DateTime<Utc>>,
    limits: HiatusLimits,
    now: DateTime<Utc>,
    window_months: u32,
) -> Result<(), HiatusRejection> {
    let mut next = profile.clone();
    close_lapsed(&mut next, now);

    let started_at = next.hiatus_started_at.unwrap_or(now);
    if !validate_period(started_at, ends_at, limits.min_days, limits.max_days) {
        return Err(HiatusRejection::InvalidPeriod);
    }

    reset_lapsed_window(&mut next, now, window_months);
    if limits.max_uses > 0 && i64::from(next.hiatus_count) >= limits.max_uses {
        return Err(HiatusRejection::UsesExhausted {
            used: next.hiatus_count,
            limit: limits.max_uses,
        });
    }

    next.is_on_hiatus = true;
    next.hiatus_started_at = Some(started_at);
    next.hiatus_ends_at = ends_at;
    if limits.max_uses > 0 {
        next.hiatus_count += 1;
    }
    next.last_hiatus_started_at = Some(now);
    *profile = next;
    Ok(())
}

/// Re-validates a new end date against the original start of the hiatus.
pub fn adjust_end(
    profile: &mut TeamMemberProfile,
    ends_at: Option<DateTime<Utc>>,
    limits: HiatusLimits,
) -> Result<(), HiatusRejection> {
    let started_at = match (profile.is_on_hiatus, profile.hiatus_started_at) {
        (true, Some(started_at)) => started_at,
        _ => return Err(HiatusRejection::NotOnHiatus),
    };
    if !validate_period(started_at, ends_at, limits.min_days, limits.max_days) {
        return Err(HiatusRejection::InvalidPeriod);
    }

    profile.hiatus_ends_at = ends_at;
    Ok(())
}

pub fn end(profile: &mut TeamMemberProfile) {
    profile.is_on_hiatus = false;
    profile.hiatus_started_at = None;
    profile.hiatus_ends_at = None;
}
