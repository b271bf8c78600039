//! Month-end value split by asset type or region.

use crate::domain::calendar::Period;
use crate::domain::instrument::{Instrument, Registry};
use crate::domain::valuation::ValueSeries;
use crate::domain::yields::safe_ratio;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Bucket for value whose instrument carries no weights in a dimension.
pub const UNCLASSIFIED: &str = "unclassified";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Type,
    Region,
}

impl Dimension {
    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Type => "type",
            Dimension::Region => "region",
        }
    }

    fn weights(self, instrument: &Instrument) -> &BTreeMap<String, f64> {
        match self {
            Dimension::Type => &instrument.types,
            Dimension::Region => &instrument.regions,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRow {
    pub date: NaiveDate,
    pub bucket: String,
    pub value: f64,
    /// Fraction of the portfolio total on `date`.
    pub share: f64,
}

/// Splits every month-end value across the buckets of `dimension` by the
/// instrument's weights and reports each bucket's share of the day's total.
pub fn allocation(values: &ValueSeries, registry: &Registry, dimension: Dimension) -> Vec<AllocationRow> {
    let mut buckets: BTreeMap<(NaiveDate, String), f64> = BTreeMap::new();
    let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();

    for (date, key, value) in values.sample(Period::Month) {
        *totals.entry(date).or_insert(0.0) += value;
        let weights = registry.get(&key.wkn).map(|i| dimension.weights(i));
        match weights.filter(|w| !w.is_empty()) {
            Some(weights) => {
                for (bucket, w) in weights {
                    *buckets.entry((date, bucket.clone())).or_insert(0.0) += value * w;
                }
            }
            None => {
                *buckets.entry((date, UNCLASSIFIED.to_string())).or_insert(0.0) += value;
            }
        }
    }

    buckets
        .into_iter()
        .map(|((date, bucket), value)| AllocationRow {
            share: safe_ratio(value, totals.get(&date).copied().unwrap_or(0.0)),
            date,
            bucket,
            value,
        })
        .collect()
}
