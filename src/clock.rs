//! Calendar source for cadence and once-per-day decisions
//!
//! Everything that depends on "today" (weekly quota days, recycling markers,
//! daily job firing) asks a `Clock`, so tests can pin the date.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc, Weekday};

/// Source of the operator-local date and time
pub trait Clock: Send + Sync {
    /// Current local date and time
    fn now(&self) -> NaiveDateTime;

    /// Current local calendar date
    fn today(&self) -> NaiveDate {
        self.now().date()
    }

    /// Current local weekday
    fn weekday(&self) -> Weekday {
        self.today().weekday()
    }
}

/// Wall clock shifted to a fixed UTC offset
#[derive(Debug, Clone)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    /// Build from an offset in minutes east of UTC; out-of-range values fall back to UTC
    pub fn with_offset_minutes(minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(minutes * 60).unwrap_or_else(|| {
            log::warn!("Invalid UTC offset {} minutes, using UTC", minutes);
            Utc.fix()
        });
        Self { offset }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::with_offset_minutes(0)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        let now: DateTime<FixedOffset> = Utc::now().with_timezone(&self.offset);
        now.naive_local()
    }
}

/// Clock pinned to one instant; the instant can be moved by tests
#[derive(Debug)]
pub struct FixedClock {
    now: std::sync::Mutex<NaiveDateTime>,
}

impl FixedClock {
    /// Pin to midnight of the given date
    pub fn on(date: NaiveDate) -> Self {
        Self::at(date.and_time(chrono::NaiveTime::MIN))
    }

    /// Pin to an exact local instant
    pub fn at(now: NaiveDateTime) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    /// Move the clock
    pub fn set(&self, now: NaiveDateTime) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
