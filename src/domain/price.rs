//! Sparse price quotes with forward-fill lookup.

use crate::domain::diagnostics::{DataWarning, Diagnostics};
use crate::domain::instrument::Registry;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

/// One row of the prices table.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub date: NaiveDate,
    pub wkn: String,
    pub price: f64,
}

/// Result of an effective-price lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceLookup {
    pub price: f64,
    /// Date of the quote used; `None` when the default price was used.
    pub quoted_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct PriceSeries {
    quotes: BTreeMap<String, BTreeMap<NaiveDate, f64>>,
    defaults: HashMap<String, f64>,
}

impl PriceSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later quotes for the same `(wkn, date)` replace earlier ones.
    pub fn from_quotes(quotes: &[PriceQuote]) -> Self {
        let mut series = Self::new();
        for q in quotes {
            series.insert(&q.wkn, q.date, q.price);
        }
        series
    }

    pub fn insert(&mut self, wkn: &str, date: NaiveDate, price: f64) {
        self.quotes
            .entry(wkn.to_string())
            .or_default()
            .insert(date, price);
    }

    /// Adds the registry's default prices as fallbacks.
    pub fn with_defaults(mut self, registry: &Registry) -> Self {
        for instrument in registry.iter() {
            if let Some(p) = instrument.default_price {
                self.defaults.insert(instrument.wkn.clone(), p);
            }
        }
        self
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.quotes
            .values()
            .filter_map(|q| q.keys().next_back().copied())
            .max()
    }

    pub fn has_quotes(&self, wkn: &str) -> bool {
        self.quotes.get(wkn).is_some_and(|q| !q.is_empty())
    }

    /// Latest quote on or before `date`, else the default price.
    pub fn effective_price(&self, wkn: &str, date: NaiveDate) -> Option<PriceLookup> {
        let quoted = self
            .quotes
            .get(wkn)
            .and_then(|q| q.range(..=date).next_back())
            .map(|(d, p)| PriceLookup {
                price: *p,
                quoted_on: Some(*d),
            });
        quoted.or_else(|| {
            self.defaults.get(wkn).map(|p| PriceLookup {
                price: *p,
                quoted_on: None,
            })
        })
    }

    /// Cross-checks quoted instruments against the registry.
    pub fn check_coverage(&self, registry: &Registry, diag: &mut Diagnostics) {
        for wkn in self.quotes.keys() {
            if !registry.contains(wkn) {
                diag.push(DataWarning::PricesWithoutInstrument { wkn: wkn.clone() });
            }
        }
        for instrument in registry.iter() {
            if !self.has_quotes(&instrument.wkn) && instrument.default_price.is_none() {
                diag.push(DataWarning::InstrumentWithoutPrices {
                    wkn: instrument.wkn.clone(),
                });
            }
        }
    }
}
