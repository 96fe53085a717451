use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::error::{Result, StudyError};

pub const DEFAULT_TIMEZONE: &str = "America/Chicago";

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// Pinned instant, used by tests and for replaying a given day
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Resolves "today" in the product's reference timezone.
#[derive(Debug, Clone, Copy)]
pub struct TimeContext {
    tz: Tz,
}

impl TimeContext {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        let tz: Tz = name
            .parse()
            .map_err(|_| StudyError::Config(format!("unknown timezone '{}'", name)))?;
        Ok(Self::new(tz))
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }
}

impl Default for TimeContext {
    fn default() -> Self {
        Self::new(chrono_tz::America::Chicago)
    }
}

/// Whole calendar days from `today` until the test. Negative once the test has passed.
pub fn days_until(test_date: Option<NaiveDate>, today: NaiveDate) -> Option<i64> {
    test_date.map(|d| d.signed_duration_since(today).num_days())
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| StudyError::invalid(format!("date '{}' is not yyyy-mm-dd", s)))
}
