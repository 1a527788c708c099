//! Lookback window ending yesterday.
//!
//! Same-day data is incomplete upstream, so the window never includes today.

use chrono::{DateTime, Days, NaiveDate, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateRangeError {
    #[error("Lookback window must be non-negative, got {0} days")]
    NegativeLookback(i64),

    #[error("Lookback window of {0} days is outside the supported calendar")]
    OutOfRange(i64),
}

/// Source of the current instant. Swapped for [`FixedClock`] in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Inclusive calendar-date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// `end` is the day before `today`, `start` is `lookback_days` before `end`.
    pub fn ending_yesterday(today: NaiveDate, lookback_days: i64) -> Result<Self, DateRangeError> {
        if lookback_days < 0 {
            return Err(DateRangeError::NegativeLookback(lookback_days));
        }

        let end = today
            .checked_sub_days(Days::new(1))
            .ok_or(DateRangeError::OutOfRange(lookback_days))?;
        let start = end
            .checked_sub_days(Days::new(lookback_days as u64))
            .ok_or(DateRangeError::OutOfRange(lookback_days))?;

        Ok(Self { start, end })
    }

    pub fn from_clock(clock: &dyn Clock, lookback_days: i64) -> Result<Self, DateRangeError> {
        Self::ending_yesterday(clock.today(), lookback_days)
    }

    pub fn start_str(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }

    /// Number of calendar days covered, both ends included.
    pub fn day_count(&self) -> usize {
        ((self.end - self.start).num_days() + 1) as usize
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start_str(), self.end_str())
    }
}

/// Convenience wrapper returning ISO date strings, as sent to the API.
pub fn compute(clock: &dyn Clock, lookback_days: i64) -> Result<(String, String), DateRangeError> {
    let range = DateRange::from_clock(clock, lookback_days)?;
    Ok((range.start_str(), range.end_str()))
}
