//! Wall-clock abstraction.
//!
//! File dates, rotation and retention are all derived from the calendar date
//! of [`Clock::now`] in the clock's own offset.

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate};
use parking_lot::Mutex;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time with the offset whose calendar date applies.
    fn now(&self) -> DateTime<FixedOffset>;

    /// Returns the current calendar date.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// The local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl ManualClock {
    /// Creates a clock frozen at `now`.
    #[must_use]
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Creates a clock frozen at noon UTC on the given date.
    #[must_use]
    pub fn at_noon(date: NaiveDate) -> Self {
        let noon = date
            .and_hms_opt(12, 0, 0)
            .unwrap_or_default()
            .and_utc()
            .fixed_offset();
        Self::new(noon)
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.now.lock() = now;
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock()
    }
}
