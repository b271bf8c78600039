//! Daily share positions per instrument and bank.

use crate::domain::booking::Ledger;
use crate::domain::calendar::{Calendar, Period};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Positions below this magnitude are reported as zero.
pub const DEFAULT_DUST_THRESHOLD: f64 = 0.0001;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HoldingKey {
    pub wkn: String,
    pub bank: String,
}

impl HoldingKey {
    pub fn new(wkn: &str, bank: &str) -> Self {
        Self {
            wkn: wkn.to_string(),
            bank: bank.to_string(),
        }
    }
}

/// Dense daily share counts. Pairs without any booking are absent.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSeries {
    calendar: Calendar,
    shares: BTreeMap<HoldingKey, Vec<f64>>,
}

impl PositionSeries {
    pub fn from_parts(calendar: Calendar, shares: BTreeMap<HoldingKey, Vec<f64>>) -> Self {
        Self { calendar, shares }
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    pub fn get(&self, key: &HoldingKey) -> Option<&[f64]> {
        self.shares.get(key).map(Vec::as_slice)
    }

    pub fn shares_on(&self, key: &HoldingKey, date: NaiveDate) -> Option<f64> {
        let i = self.calendar.index_of(date)?;
        self.shares.get(key).map(|s| s[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HoldingKey, &Vec<f64>)> {
        self.shares.iter()
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    /// Shares per `wkn`, summed over banks.
    pub fn by_instrument(&self) -> BTreeMap<String, Vec<f64>> {
        let mut out: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (key, series) in &self.shares {
            let acc = out
                .entry(key.wkn.clone())
                .or_insert_with(|| vec![0.0; self.calendar.len()]);
            for (a, s) in acc.iter_mut().zip(series) {
                *a += s;
            }
        }
        out
    }

    /// Shares per `(wkn, bank)` on the last day of each period.
    pub fn sample(&self, period: Period) -> Vec<(NaiveDate, HoldingKey, f64)> {
        let ends = self.calendar.period_ends(period);
        let mut rows = Vec::with_capacity(ends.len() * self.shares.len());
        for i in ends {
            let date = self.calendar.date_at(i);
            for (key, series) in &self.shares {
                rows.push((date, key.clone(), series[i]));
            }
        }
        rows
    }
}

/// Running sum of `delta_shares` per `(wkn, bank)`, reindexed to every
/// calendar day.
///
/// Same-day deltas are summed before the running sum. Bookings dated before
/// the calendar start form the opening balance; bookings after the end are
/// ignored.
pub fn build_positions(ledger: &Ledger, calendar: &Calendar, dust_threshold: f64) -> PositionSeries {
    let mut opening: BTreeMap<HoldingKey, f64> = BTreeMap::new();
    let mut deltas: BTreeMap<HoldingKey, Vec<f64>> = BTreeMap::new();

    for entry in ledger.entries() {
        let b = &entry.booking;
        if b.date > calendar.end() {
            continue;
        }
        let key = HoldingKey::new(&b.wkn, &b.bank);
        let daily = deltas
            .entry(key.clone())
            .or_insert_with(|| vec![0.0; calendar.len()]);
        match calendar.index_of(b.date) {
            Some(i) => daily[i] += b.delta_shares,
            None => *opening.entry(key).or_insert(0.0) += b.delta_shares,
        }
    }

    let shares = deltas
        .into_iter()
        .map(|(key, daily)| {
            let mut running = opening.get(&key).copied().unwrap_or(0.0);
            let series = daily
                .into_iter()
                .map(|delta| {
                    running += delta;
                    if running.abs() < dust_threshold {
                        0.0
                    } else {
                        running
                    }
                })
                .collect();
            (key, series)
        })
        .collect();

    PositionSeries {
        calendar: *calendar,
        shares,
    }
}
