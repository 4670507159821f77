//! Daily reset boundary arithmetic.
//!
//! The event day does not start at midnight: a configured wall-clock
//! time (UTC) divides one event day from the next. The clock derives,
//! for any instant, where the surrounding boundaries lie and which
//! calendar label the current event day carries.
//!
//! # Design Principles
//!
//! - A boundary's *stamp* is the calendar date of the day it opens. The
//!   persisted `last_reset` stamp compares against it to decide whether
//!   a reset is owed, so the derivation must be total and deterministic.
//! - All date arithmetic is checked; out-of-range dates surface as
//!   errors instead of wrapping.

use chrono::{DateTime, Days, Duration, NaiveDate, Utc};

/// Errors that can occur during boundary derivations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// The configured reset time is not a valid time of day.
    #[error("invalid reset schedule: {reason}")]
    InvalidSchedule {
        /// Explanation of what is wrong with the schedule.
        reason: String,
    },

    /// A derived instant falls outside the representable date range.
    #[error("boundary out of range for {instant}")]
    OutOfRange {
        /// The instant the derivation started from.
        instant: DateTime<Utc>,
    },
}

/// The wall-clock time (UTC) at which one event day rolls into the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetClock {
    /// Boundary hour, `0..=23`.
    hour: u32,
    /// Boundary minute, `0..=59`.
    minute: u32,
}

impl ResetClock {
    /// Create a clock for a daily boundary at `hour:minute` UTC.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidSchedule`] when the pair is not a
    /// valid time of day.
    pub fn new(hour: u32, minute: u32) -> Result<Self, ClockError> {
        if hour > 23 {
            return Err(ClockError::InvalidSchedule {
                reason: format!("hour {hour} out of range 0-23"),
            });
        }
        if minute > 59 {
            return Err(ClockError::InvalidSchedule {
                reason: format!("minute {minute} out of range 0-59"),
            });
        }
        Ok(Self { hour, minute })
    }

    /// The configured boundary hour.
    pub const fn hour(&self) -> u32 {
        self.hour
    }

    /// The configured boundary minute.
    pub const fn minute(&self) -> u32 {
        self.minute
    }

    /// The first boundary strictly after `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::OutOfRange`] when the derived instant is
    /// not representable.
    pub fn next_boundary(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, ClockError> {
        let today = self.boundary_on(now.date_naive(), now)?;
        if now < today {
            return Ok(today);
        }
        today
            .checked_add_days(Days::new(1))
            .ok_or(ClockError::OutOfRange { instant: now })
    }

    /// The most recent boundary at or before `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::OutOfRange`] when the derived instant is
    /// not representable.
    pub fn previous_boundary(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, ClockError> {
        let today = self.boundary_on(now.date_naive(), now)?;
        if now >= today {
            return Ok(today);
        }
        today
            .checked_sub_days(Days::new(1))
            .ok_or(ClockError::OutOfRange { instant: now })
    }

    /// The calendar label of the event day a boundary opens.
    pub fn stamp(boundary: DateTime<Utc>) -> NaiveDate {
        boundary.date_naive()
    }

    /// True when `now` lies inside the preparation window before the
    /// next boundary.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::OutOfRange`] when the next boundary is not
    /// representable.
    pub fn within_margin(&self, now: DateTime<Utc>, margin: Duration) -> Result<bool, ClockError> {
        let next = self.next_boundary(now)?;
        Ok(next.signed_duration_since(now) <= margin)
    }

    /// The boundary instant on a specific calendar date.
    fn boundary_on(self, date: NaiveDate, origin: DateTime<Utc>) -> Result<DateTime<Utc>, ClockError> {
        // hour/minute were validated at construction; and_hms_opt only
        // fails when they are out of range.
        date.and_hms_opt(self.hour, self.minute, 0)
            .map(|naive| naive.and_utc())
            .ok_or(ClockError::OutOfRange { instant: origin })
    }
}
