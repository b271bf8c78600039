//! Portfolio overview and per-bank depot statement.

use crate::domain::calendar::{Calendar, Period, sample_period_ends, sum_per_period};
use crate::domain::instrument::{InstrumentClass, Registry};
use crate::domain::valuation::ValueSeries;
use chrono::NaiveDate;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct OverviewRow {
    pub date: NaiveDate,
    pub non_cash: f64,
    /// Cash, call money and fixed-term deposits.
    pub cash_like: f64,
    pub unrealized_gains_losses: f64,
    pub invest: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BankStatementRow {
    pub date: NaiveDate,
    pub bank: String,
    pub cash: f64,
    pub non_cash: f64,
}

/// Daily overview series, before any period reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct Overview {
    calendar: Calendar,
    non_cash: Vec<f64>,
    cash_like: Vec<f64>,
    unrealized: Vec<f64>,
    invest: Vec<f64>,
}

impl Overview {
    pub fn build(
        values: &ValueSeries,
        registry: &Registry,
        unrealized_by_wkn: &BTreeMap<String, Vec<f64>>,
        invest: &[f64],
    ) -> Self {
        let calendar = *values.calendar();
        let is_cash_like = |wkn: &str| registry.class_of(wkn).is_some_and(|c| c.is_cash_like());

        let mut unrealized = vec![0.0; calendar.len()];
        for series in unrealized_by_wkn.values() {
            for (u, g) in unrealized.iter_mut().zip(series) {
                *u += g;
            }
        }

        Self {
            calendar,
            non_cash: values.total_where(|k| !is_cash_like(&k.wkn)),
            cash_like: values.total_where(|k| is_cash_like(&k.wkn)),
            unrealized,
            invest: invest.to_vec(),
        }
    }

    pub fn daily(&self) -> Vec<OverviewRow> {
        self.calendar
            .dates()
            .enumerate()
            .map(|(i, date)| OverviewRow {
                date,
                non_cash: self.non_cash[i],
                cash_like: self.cash_like[i],
                unrealized_gains_losses: self.unrealized[i],
                invest: self.invest.get(i).copied().unwrap_or(0.0),
            })
            .collect()
    }

    /// Values at period ends; gains and invested money summed over the period.
    pub fn per_period(&self, period: Period) -> Vec<OverviewRow> {
        let non_cash = sample_period_ends(&self.calendar, &self.non_cash, period);
        let cash_like = sample_period_ends(&self.calendar, &self.cash_like, period);
        let unrealized = sum_per_period(&self.calendar, &self.unrealized, period);
        let invest = sum_per_period(&self.calendar, &self.invest, period);

        non_cash
            .into_iter()
            .zip(cash_like)
            .zip(unrealized)
            .zip(invest)
            .map(|((((date, nc), (_, c)), (_, u)), (_, inv))| OverviewRow {
                date,
                non_cash: nc,
                cash_like: c,
                unrealized_gains_losses: u,
                invest: inv,
            })
            .collect()
    }
}

/// Cash and non-cash holdings per bank at every month end. Only the `Cash`
/// class counts as cash here.
pub fn depot_statement(values: &ValueSeries, registry: &Registry) -> Vec<BankStatementRow> {
    let mut acc: BTreeMap<(NaiveDate, String), (f64, f64)> = BTreeMap::new();
    for (date, key, value) in values.sample(Period::Month) {
        let entry = acc.entry((date, key.bank)).or_insert((0.0, 0.0));
        if registry.class_of(&key.wkn) == Some(InstrumentClass::Cash) {
            entry.0 += value;
        } else {
            entry.1 += value;
        }
    }
    acc.into_iter()
        .map(|((date, bank), (cash, non_cash))| BankStatementRow {
            date,
            bank,
            cash,
            non_cash,
        })
        .collect()
}
