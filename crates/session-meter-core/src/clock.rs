//! Time sources for the engine.
//!
//! Elapsed session time is counted in ticks, not read from a clock. The clock
//! only stamps start/end times and decides which local calendar day the
//! free-minute counter belongs to.

use chrono::{DateTime, Datelike, Local, NaiveDate, Utc};
use std::sync::atomic::{AtomicI32, Ordering};

/// A source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Current local calendar date.
    fn today(&self) -> NaiveDate;
}

/// The system clock, using the local timezone for the calendar date.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock whose calendar date is set by hand. Used by simulations and tests
/// to cross local midnight without waiting.
#[derive(Debug)]
pub struct ManualClock {
    days_from_ce: AtomicI32,
}

impl ManualClock {
    /// Create a clock pinned to `date`.
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self {
            days_from_ce: AtomicI32::new(date.num_days_from_ce()),
        }
    }

    /// Move the clock to `date`.
    pub fn set_date(&self, date: NaiveDate) {
        self.days_from_ce
            .store(date.num_days_from_ce(), Ordering::SeqCst);
    }

    /// Advance the clock by whole days.
    pub fn advance_days(&self, days: i32) {
        self.days_from_ce.fetch_add(days, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.today()
            .and_hms_opt(12, 0, 0)
            .map_or_else(Utc::now, |dt| dt.and_utc())
    }

    fn today(&self) -> NaiveDate {
        NaiveDate::from_num_days_from_ce_opt(self.days_from_ce.load(Ordering::SeqCst))
            .unwrap_or(NaiveDate::MIN)
    }
}
