//! Wall-clock abstraction.

use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// Source of the current time in the engine's configured time zone.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;

    /// Today's date in the clock's time zone.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// The real clock, viewed through a named time zone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    zone: Tz,
}

impl SystemClock {
    pub fn new(zone: Tz) -> Self {
        Self { zone }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.zone)
    }
}

/// A manually driven clock, for tests and one-off runs at a given date.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Tz>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Tz>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// A clock at 09:00 on `date` in `zone`.
    pub fn at_date(date: NaiveDate, zone: Tz) -> Self {
        let now = date
            .and_hms_opt(9, 0, 0)
            .and_then(|dt| dt.and_local_timezone(zone).earliest())
            .unwrap_or_else(|| Utc::now().with_timezone(&zone));
        Self::new(now)
    }

    /// Move to `now`, keeping the clock's own time zone.
    pub fn set<Z: TimeZone>(&self, now: DateTime<Z>) {
        let mut current = self.now.lock().unwrap();
        let zone = current.timezone();
        *current = now.with_timezone(&zone);
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Tz> {
        *self.now.lock().unwrap()
    }
}
