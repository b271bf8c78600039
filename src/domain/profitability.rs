//! Yearly holding days and time-weighted returns per instrument.

use crate::domain::error::DepotError;
use crate::domain::yields::YieldSeries;
use chrono::Datelike;
use std::collections::{BTreeMap, BTreeSet, HashSet};

pub const DAYS_SUFFIX: &str = "_days";
pub const YIELD_SUFFIX: &str = "_yield";

#[derive(Debug, Clone, PartialEq)]
pub struct YearProfit {
    pub year: i32,
    pub wkn: String,
    pub days_held: usize,
    pub annual_yield: f64,
}

/// Long view, ordered by year then `wkn`. A `(year, wkn)` without held days
/// has no row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProfitabilityTable {
    rows: Vec<YearProfit>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PivotRow {
    pub year: i32,
    /// Parallel to [`PivotTable::columns`].
    pub cells: Vec<Option<f64>>,
}

/// One row per year, a `<wkn>_days` and a `<wkn>_yield` column per
/// instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotTable {
    pub columns: Vec<String>,
    pub rows: Vec<PivotRow>,
}

/// `Π(1 + y) − 1`. An empty sequence compounds to 0.
pub fn compound(yields: impl IntoIterator<Item = f64>) -> f64 {
    yields.into_iter().fold(1.0, |acc, y| acc * (1.0 + y)) - 1.0
}

/// Compounds the price yield of every day with a positive aggregated
/// position, grouped by calendar year.
pub fn aggregate(
    yields: &YieldSeries,
    shares_by_wkn: &BTreeMap<String, Vec<f64>>,
) -> ProfitabilityTable {
    let calendar = yields.calendar();
    let mut acc: BTreeMap<(i32, String), (usize, f64)> = BTreeMap::new();

    for (wkn, days) in yields.iter() {
        let Some(shares) = shares_by_wkn.get(wkn) else {
            continue;
        };
        for (i, day) in days.iter().enumerate() {
            if shares[i] <= 0.0 {
                continue;
            }
            let year = calendar.date_at(i).year();
            let entry = acc.entry((year, wkn.clone())).or_insert((0, 1.0));
            entry.0 += 1;
            entry.1 *= 1.0 + day.price_yield;
        }
    }

    let rows = acc
        .into_iter()
        .map(|((year, wkn), (days_held, growth))| YearProfit {
            year,
            wkn,
            days_held,
            annual_yield: growth - 1.0,
        })
        .collect();
    ProfitabilityTable { rows }
}

/// Column names for the pivot view. Fails if two instruments would share a
/// column.
pub fn pivot_columns<'a>(wkns: impl IntoIterator<Item = &'a str>) -> Result<Vec<String>, DepotError> {
    let mut seen = HashSet::from(["year".to_string()]);
    let mut columns = Vec::new();
    for wkn in wkns {
        for suffix in [DAYS_SUFFIX, YIELD_SUFFIX] {
            let column = format!("{wkn}{suffix}");
            if !seen.insert(column.clone()) {
                return Err(DepotError::DuplicateColumn { column });
            }
            columns.push(column);
        }
    }
    Ok(columns)
}

impl ProfitabilityTable {
    pub fn rows(&self) -> &[YearProfit] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, year: i32, wkn: &str) -> Option<&YearProfit> {
        self.rows.iter().find(|r| r.year == year && r.wkn == wkn)
    }

    pub fn years(&self) -> BTreeSet<i32> {
        self.rows.iter().map(|r| r.year).collect()
    }

    pub fn wkns(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|r| r.wkn.as_str()).collect()
    }

    pub fn pivot(&self) -> Result<PivotTable, DepotError> {
        let wkns: Vec<&str> = self.wkns().into_iter().collect();
        let columns = pivot_columns(wkns.iter().copied())?;
        let slot: BTreeMap<&str, usize> = wkns.iter().enumerate().map(|(i, w)| (*w, i)).collect();

        let rows = self
            .years()
            .into_iter()
            .map(|year| {
                let mut cells = vec![None; columns.len()];
                for r in self.rows.iter().filter(|r| r.year == year) {
                    let s = slot[r.wkn.as_str()];
                    cells[2 * s] = Some(r.days_held as f64);
                    cells[2 * s + 1] = Some(r.annual_yield);
                }
                PivotRow { year, cells }
            })
            .collect();

        Ok(PivotTable { columns, rows })
    }
}
