//! Daily monetary values: positions times effective prices.

use crate::domain::calendar::{Calendar, Period};
use crate::domain::diagnostics::{DataWarning, Diagnostics};
use crate::domain::position::{HoldingKey, PositionSeries};
use crate::domain::price::{PriceLookup, PriceSeries};
use chrono::NaiveDate;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ValueSeries {
    calendar: Calendar,
    values: BTreeMap<HoldingKey, Vec<f64>>,
}

impl ValueSeries {
    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    pub fn get(&self, key: &HoldingKey) -> Option<&[f64]> {
        self.values.get(key).map(Vec::as_slice)
    }

    pub fn value_on(&self, key: &HoldingKey, date: NaiveDate) -> Option<f64> {
        let i = self.calendar.index_of(date)?;
        self.values.get(key).map(|v| v[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HoldingKey, &Vec<f64>)> {
        self.values.iter()
    }

    pub fn by_instrument(&self) -> BTreeMap<String, Vec<f64>> {
        self.group_by(|k| &k.wkn)
    }

    pub fn by_bank(&self) -> BTreeMap<String, Vec<f64>> {
        self.group_by(|k| &k.bank)
    }

    /// Grand total per day over every `(wkn, bank)`.
    pub fn total(&self) -> Vec<f64> {
        let mut total = vec![0.0; self.calendar.len()];
        for series in self.values.values() {
            for (t, v) in total.iter_mut().zip(series) {
                *t += v;
            }
        }
        total
    }

    /// Sum of the values whose key matches `keep`.
    pub fn total_where(&self, keep: impl Fn(&HoldingKey) -> bool) -> Vec<f64> {
        let mut total = vec![0.0; self.calendar.len()];
        for (_, series) in self.values.iter().filter(|(k, _)| keep(k)) {
            for (t, v) in total.iter_mut().zip(series) {
                *t += v;
            }
        }
        total
    }

    /// Values per `(wkn, bank)` on the last day of each period.
    pub fn sample(&self, period: Period) -> Vec<(NaiveDate, HoldingKey, f64)> {
        let ends = self.calendar.period_ends(period);
        let mut rows = Vec::with_capacity(ends.len() * self.values.len());
        for i in ends {
            let date = self.calendar.date_at(i);
            for (key, series) in &self.values {
                rows.push((date, key.clone(), series[i]));
            }
        }
        rows
    }

    fn group_by(&self, field: impl Fn(&HoldingKey) -> &String) -> BTreeMap<String, Vec<f64>> {
        let mut out: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (key, series) in &self.values {
            let acc = out
                .entry(field(key).clone())
                .or_insert_with(|| vec![0.0; self.calendar.len()]);
            for (a, v) in acc.iter_mut().zip(series) {
                *a += v;
            }
        }
        out
    }
}

/// Effective price of `wkn` on every calendar day.
pub fn daily_prices(prices: &PriceSeries, wkn: &str, calendar: &Calendar) -> Vec<Option<PriceLookup>> {
    calendar
        .dates()
        .map(|date| prices.effective_price(wkn, date))
        .collect()
}

/// Values every held position.
///
/// A held day without any price is valued at 0 and reported once per
/// instrument. A forward fill spanning more than `stale_price_days` calendar
/// days is reported once per instrument with its longest gap.
pub fn build_values(
    positions: &PositionSeries,
    prices: &PriceSeries,
    stale_price_days: i64,
    diag: &mut Diagnostics,
) -> ValueSeries {
    let calendar = *positions.calendar();
    let mut price_cache: BTreeMap<&str, Vec<Option<PriceLookup>>> = BTreeMap::new();
    let mut missing: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    let mut stale: BTreeMap<&str, (i64, NaiveDate)> = BTreeMap::new();
    let mut values = BTreeMap::new();

    for (key, shares) in positions.iter() {
        let wkn = key.wkn.as_str();
        let daily = price_cache
            .entry(wkn)
            .or_insert_with(|| daily_prices(prices, wkn, &calendar));

        let mut series = vec![0.0; calendar.len()];
        for (i, (&held, lookup)) in shares.iter().zip(daily.iter()).enumerate() {
            if held == 0.0 {
                continue;
            }
            let date = calendar.date_at(i);
            match lookup {
                Some(l) => {
                    series[i] = held * l.price;
                    if let Some(q) = l.quoted_on {
                        let gap = (date - q).num_days();
                        let worst = stale.entry(wkn).or_insert((0, date));
                        if gap > worst.0 {
                            *worst = (gap, date);
                        }
                    }
                }
                None => missing.entry(wkn).or_default().push(i),
            }
        }
        values.insert(key.clone(), series);
    }

    for (wkn, mut days) in missing {
        days.sort_unstable();
        days.dedup();
        diag.push(DataWarning::MissingPrice {
            wkn: wkn.to_string(),
            first_date: calendar.date_at(days[0]),
            days: days.len(),
        });
    }
    for (wkn, (gap, date)) in stale {
        if gap > stale_price_days {
            diag.push(DataWarning::StalePrice {
                wkn: wkn.to_string(),
                date,
                gap_days: gap,
            });
        }
    }

    ValueSeries { calendar, values }
}

/// `shares(t) × (price(t) − price(t−1))` per `wkn`, banks collapsed. Days
/// without a price on either side contribute 0.
pub fn unrealized_gains(
    shares_by_wkn: &BTreeMap<String, Vec<f64>>,
    prices: &PriceSeries,
    calendar: &Calendar,
) -> BTreeMap<String, Vec<f64>> {
    shares_by_wkn
        .iter()
        .map(|(wkn, shares)| {
            let daily = daily_prices(prices, wkn, calendar);
            let mut gains = vec![0.0; calendar.len()];
            for i in 1..calendar.len() {
                if let (Some(now), Some(before)) = (daily[i], daily[i - 1]) {
                    gains[i] = shares[i] * (now.price - before.price);
                }
            }
            (wkn.clone(), gains)
        })
        .collect()
}
