//! Trailing date windows over the activity ledger
//!
//! An n-day window holds exactly n dates ending today. Classification and
//! the snapshot views use the same construction, so a `30d` snapshot and the
//! 30-day inactivity window cover the same dates.

use super::types::DailyActivityRecord;
use chrono::{Duration, NaiveDate};

/// Inclusive range of UTC dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrailingWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl TrailingWindow {
    /// Window of exactly `days` dates ending at `today` (minimum one date)
    pub fn last_n_days(today: NaiveDate, days: u32) -> Self {
        let span = i64::from(days.max(1)) - 1;
        Self {
            start: today - Duration::days(span),
            end: today,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of dates covered
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// The adjacent window of equal length that ends the day before this one starts
    pub fn preceding(&self) -> Self {
        let end = self.start - Duration::days(1);
        Self {
            start: end - Duration::days(self.len_days() - 1),
            end,
        }
    }

    /// Every date in the window, oldest first
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.len_days()).map(move |offset| start + Duration::days(offset))
    }

    /// Sum of counts for records falling inside the window
    pub fn sum<'a, I>(&self, records: I) -> i64
    where
        I: IntoIterator<Item = &'a DailyActivityRecord>,
    {
        records
            .into_iter()
            .filter(|r| self.contains(r.date))
            .map(|r| r.count)
            .sum()
    }
}
