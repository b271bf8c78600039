//! Dense daily calendar and period reduction.
//!
//! Every derived series in the engine is a `Vec` indexed by calendar day, so
//! alignment across instruments, banks and bookings is a matter of sharing
//! one [`Calendar`].

use crate::domain::error::DepotError;
use chrono::{Datelike, NaiveDate};

/// Closed range of consecutive calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    start: NaiveDate,
    len: usize,
}

/// Reduction period for month-end / year-end views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Month,
    Year,
}

impl Period {
    fn key(self, date: NaiveDate) -> (i32, u32) {
        match self {
            Period::Month => (date.year(), date.month()),
            Period::Year => (date.year(), 0),
        }
    }
}

impl Calendar {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DepotError> {
        if end < start {
            return Err(DepotError::InvalidRange { start, end });
        }
        let len = (end - start).num_days() as usize + 1;
        Ok(Self { start, len })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.date_at(self.len - 1)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.index_of(date).is_some()
    }

    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        if date < self.start {
            return None;
        }
        let offset = (date - self.start).num_days() as usize;
        (offset < self.len).then_some(offset)
    }

    pub fn date_at(&self, index: usize) -> NaiveDate {
        self.start + chrono::Duration::days(index as i64)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        (0..self.len).map(|i| self.date_at(i))
    }

    /// Index of the last day of every month/year in the range. The range end
    /// is always included, even when it falls mid-period.
    pub fn period_ends(&self, period: Period) -> Vec<usize> {
        self.period_ranges(period)
            .into_iter()
            .map(|r| r.end - 1)
            .collect()
    }

    /// Half-open index ranges covering each month/year inside the calendar.
    pub fn period_ranges(&self, period: Period) -> Vec<std::ops::Range<usize>> {
        let mut ranges = Vec::new();
        let mut begin = 0;
        for i in 1..=self.len {
            let boundary =
                i == self.len || period.key(self.date_at(i)) != period.key(self.date_at(i - 1));
            if boundary {
                ranges.push(begin..i);
                begin = i;
            }
        }
        ranges
    }
}

/// Values of `series` on the last day of each period.
pub fn sample_period_ends(
    calendar: &Calendar,
    series: &[f64],
    period: Period,
) -> Vec<(NaiveDate, f64)> {
    calendar
        .period_ends(period)
        .into_iter()
        .map(|i| (calendar.date_at(i), series.get(i).copied().unwrap_or(0.0)))
        .collect()
}

/// Sum of `series` per period, labelled with the period's last date.
pub fn sum_per_period(calendar: &Calendar, series: &[f64], period: Period) -> Vec<(NaiveDate, f64)> {
    calendar
        .period_ranges(period)
        .into_iter()
        .map(|r| {
            let label = calendar.date_at(r.end - 1);
            let total = series.get(r).map(|s| s.iter().sum()).unwrap_or(0.0);
            (label, total)
        })
        .collect()
}
