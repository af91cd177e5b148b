//! UTC day windows.
//!
//! "Today" and "selected date" always mean a UTC calendar day here, never the
//! host's local day.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Inclusive `[00:00:00.000, 23:59:59.999]` instant range of one UTC date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct DayWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    #[must_use]
    pub fn for_date(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        let end = start + Duration::days(1) - Duration::milliseconds(1);
        Self { start, end }
    }

    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    /// True when `at` falls on this window's UTC date.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at.date_naive() == self.date()
    }
}

/// Window of the UTC calendar day containing `at`.
#[must_use]
pub fn day_window(at: DateTime<Utc>) -> DayWindow {
    DayWindow::for_date(at.date_naive())
}

/// Window of the current UTC day.
#[must_use]
pub fn today() -> DayWindow {
    day_window(Utc::now())
}

#[must_use]
pub fn same_utc_day(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.date_naive() == b.date_naive()
}
