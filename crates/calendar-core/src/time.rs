//! Time helpers for calendar queries.
//!
//! This module provides [`TimeWindow`] for the day/week/month range queries
//! and the second-resolution truncation used when matching notification
//! timestamps.

use chrono::{DateTime, Duration, Months, NaiveTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Truncates a timestamp to whole seconds.
///
/// Notification times are stored and compared at this resolution, so a
/// scheduler tick that fires a few milliseconds late still matches.
pub fn truncate_to_second(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.trunc_subsecs(0)
}

/// Returns midnight UTC of the day containing `dt`.
pub fn midnight(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Returns the instant `months` calendar months before `now`.
///
/// Saturates at the earliest representable instant.
pub fn retention_cutoff(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// A time window for querying calendar events.
///
/// Represents a half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new time window.
    ///
    /// # Panics
    ///
    /// Panics if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(start <= end, "TimeWindow start must be <= end");
        Self { start, end }
    }

    /// Creates a time window from a start time and duration.
    ///
    /// The end saturates at the latest representable instant.
    ///
    /// # Panics
    ///
    /// Panics if `duration` is negative.
    pub fn from_duration(start: DateTime<Utc>, duration: Duration) -> Self {
        let end = start
            .checked_add_signed(duration)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::new(start, end)
    }

    /// The calendar day containing `reference`: `[midnight, midnight + 24h)`.
    pub fn day(reference: DateTime<Utc>) -> Self {
        Self::from_duration(midnight(reference), Duration::days(1))
    }

    /// Seven days starting at `reference`.
    pub fn week(reference: DateTime<Utc>) -> Self {
        Self::from_duration(reference, Duration::days(7))
    }

    /// One calendar month starting at `reference`.
    ///
    /// Uses calendar arithmetic, so January 31st spans to the last day of
    /// February rather than a fixed 30 days.
    pub fn month(reference: DateTime<Utc>) -> Self {
        let end = reference
            .checked_add_months(Months::new(1))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::new(reference, end)
    }

    /// Returns the duration of this time window.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Checks if a datetime falls within this window.
    ///
    /// Uses half-open interval semantics: `[start, end)`.
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        self.start <= dt && dt < self.end
    }
}
