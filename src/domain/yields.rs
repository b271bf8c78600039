//! Yield decomposition with an adaptive denominator.
//!
//! Per `(date, wkn)`, banks collapsed:
//!
//! - `prior` is the previous day's value (0 before the calendar start),
//! - `tx` is the summed `transaction_value_at_price` of the day,
//! - `gains = value - prior + tx`,
//! - gains are zeroed on an opening day (no shares yesterday, shares today),
//! - the denominator is `prior`, unless the day is a large transaction
//!   (`prior <= 0` or `|tx| > threshold × prior`), in which case it is `|tx|`,
//! - every ratio over a zero denominator is 0.
//!
//! Each rule is a mask vector applied uniformly over the whole series.

use crate::domain::booking::InstrumentFlows;
use crate::domain::calendar::Calendar;
use crate::domain::instrument::{CashExclusion, Registry};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const DEFAULT_LARGE_TRANSACTION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DailyYield {
    pub gains_losses: f64,
    pub dividends: f64,
    pub fees: f64,
    pub taxes: f64,
    pub denominator: f64,
    /// The transaction value replaced the prior value as denominator.
    pub large_transaction: bool,
    pub price_yield: f64,
    pub dividend_yield: f64,
    pub fee_yield: f64,
    pub tax_yield: f64,
}

impl DailyYield {
    pub fn total_yield(&self) -> f64 {
        self.price_yield + self.dividend_yield + self.fee_yield + self.tax_yield
    }

    /// True if any monetary component is nonzero.
    pub fn is_active(&self) -> bool {
        self.gains_losses != 0.0 || self.dividends != 0.0 || self.fees != 0.0 || self.taxes != 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct YieldSeries {
    calendar: Calendar,
    components: BTreeMap<String, Vec<DailyYield>>,
    large_transaction_days: usize,
}

impl YieldSeries {
    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    pub fn get(&self, wkn: &str) -> Option<&[DailyYield]> {
        self.components.get(wkn).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<DailyYield>)> {
        self.components.iter()
    }

    pub fn contains(&self, wkn: &str) -> bool {
        self.components.contains_key(wkn)
    }

    pub fn large_transaction_days(&self) -> usize {
        self.large_transaction_days
    }
}

fn lag(series: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(series.len());
    out.push(0.0);
    out.extend_from_slice(&series[..series.len().saturating_sub(1)]);
    out
}

/// True where the denominator switches to `|tx|`.
pub fn large_transaction_mask(prior: &[f64], tx: &[f64], threshold: f64) -> Vec<bool> {
    prior
        .iter()
        .zip(tx)
        .map(|(&p, &t)| !(p > 0.0 && t.abs() <= threshold * p))
        .collect()
}

/// True where the aggregated position opens: zero yesterday, nonzero today.
pub fn opening_day_mask(shares: &[f64]) -> Vec<bool> {
    lag(shares)
        .iter()
        .zip(shares)
        .map(|(&before, &now)| before == 0.0 && now != 0.0)
        .collect()
}

pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Decomposes daily returns for every instrument not excluded by `policy`.
///
/// `values_by_wkn` and `shares_by_wkn` are banks-collapsed daily series;
/// instruments without flows on a day contribute zero transaction value.
pub fn decompose(
    calendar: &Calendar,
    values_by_wkn: &BTreeMap<String, Vec<f64>>,
    shares_by_wkn: &BTreeMap<String, Vec<f64>>,
    flows: &BTreeMap<String, InstrumentFlows>,
    registry: &Registry,
    policy: CashExclusion,
    threshold: f64,
) -> YieldSeries {
    let zeros = InstrumentFlows::zeros(calendar.len());
    let no_shares = vec![0.0; calendar.len()];
    let mut components = BTreeMap::new();
    let mut large_transaction_days = 0;

    for (wkn, value) in values_by_wkn {
        if registry.is_excluded(wkn, policy) {
            continue;
        }
        let f = flows.get(wkn).unwrap_or(&zeros);
        let shares = shares_by_wkn.get(wkn).unwrap_or(&no_shares);

        let prior = lag(value);
        let large = large_transaction_mask(&prior, &f.transaction_value, threshold);
        let opening = opening_day_mask(shares);

        let days: Vec<DailyYield> = (0..calendar.len())
            .map(|i| {
                let tx = f.transaction_value[i];
                let gains = if opening[i] {
                    0.0
                } else {
                    value[i] - prior[i] + tx
                };
                let denominator = if large[i] { tx.abs() } else { prior[i] };
                DailyYield {
                    gains_losses: gains,
                    dividends: f.dividends[i],
                    fees: f.fees[i],
                    taxes: f.taxes[i],
                    denominator,
                    large_transaction: large[i] && tx != 0.0,
                    price_yield: safe_ratio(gains, denominator),
                    dividend_yield: safe_ratio(f.dividends[i], denominator),
                    fee_yield: safe_ratio(f.fees[i], denominator),
                    tax_yield: safe_ratio(f.taxes[i], denominator),
                }
            })
            .collect();

        for (i, day) in days.iter().enumerate().filter(|(_, d)| d.large_transaction) {
            debug!(
                wkn = %wkn,
                date = %calendar.date_at(i),
                prior = prior[i],
                denominator = day.denominator,
                "large transaction: denominator switched to transaction value"
            );
        }
        large_transaction_days += days.iter().filter(|d| d.large_transaction).count();
        components.insert(wkn.clone(), days);
    }

    info!(
        instruments = components.len(),
        large_transaction_days, "yield decomposition complete"
    );

    YieldSeries {
        calendar: *calendar,
        components,
        large_transaction_days,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::{Instrument, InstrumentClass};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn calendar(days: u32) -> Calendar {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        Calendar::new(start, NaiveDate::from_ymd_opt(2024, 1, days).unwrap()).unwrap()
    }

    fn registry() -> Registry {
        Registry::new(
            vec![
                Instrument::new("x", InstrumentClass::Security),
                Instrument::new("cash", InstrumentClass::Cash),
                Instrument::new("tg", InstrumentClass::CallMoney),
            ],
            None,
        )
        .unwrap()
    }

    fn flows_with_tx(tx: Vec<f64>) -> InstrumentFlows {
        InstrumentFlows {
            transaction_value: tx.clone(),
            ..InstrumentFlows::zeros(tx.len())
        }
    }

    fn run(values: Vec<f64>, shares: Vec<f64>, flows: InstrumentFlows) -> Vec<DailyYield> {
        let cal = calendar(values.len() as u32);
        let series = decompose(
            &cal,
            &BTreeMap::from([("x".to_string(), values)]),
            &BTreeMap::from([("x".to_string(), shares)]),
            &BTreeMap::from([("x".to_string(), flows)]),
            &registry(),
            CashExclusion::CashOnly,
            DEFAULT_LARGE_TRANSACTION_THRESHOLD,
        );
        series.get("x").unwrap().to_vec()
    }

    #[test]
    fn mask_selects_prior_only_for_small_transactions() {
        let mask = large_transaction_mask(
            &[100.0, 100.0, 100.0, 0.0],
            &[50.0, -51.0, 0.0, 0.0],
            0.5,
        );
        assert_eq!(mask, vec![false, true, false, true]);
    }

    #[test]
    fn opening_mask_fires_on_re_entry() {
        let mask = opening_day_mask(&[1.0, 1.0, 0.0, 2.0]);
        assert_eq!(mask, vec![true, false, false, true]);
    }

    #[test]
    fn first_day_price_yield_is_zero() {
        let days = run(vec![1010.0, 1030.0], vec![10.0, 10.0], flows_with_tx(vec![-1000.0, 0.0]));
        assert_eq!(days[0].gains_losses, 0.0);
        assert_eq!(days[0].price_yield, 0.0);
        assert_eq!(days[0].denominator, 1000.0);
        assert!(days[0].large_transaction);
        assert_relative_eq!(days[1].price_yield, 20.0 / 1010.0);
    }

    #[test]
    fn large_deposit_uses_transaction_value() {
        let days = run(
            vec![100.0, 750.0],
            vec![1.0, 7.0],
            flows_with_tx(vec![0.0, -600.0]),
        );
        assert_relative_eq!(days[1].gains_losses, 50.0);
        assert_relative_eq!(days[1].denominator, 600.0);
        assert_relative_eq!(days[1].price_yield, 50.0 / 600.0);
    }

    #[test]
    fn small_transaction_keeps_prior_value() {
        let days = run(
            vec![100.0, 155.0],
            vec![1.0, 1.5],
            flows_with_tx(vec![0.0, -50.0]),
        );
        assert_relative_eq!(days[1].denominator, 100.0);
        assert_relative_eq!(days[1].price_yield, 0.05);
        assert!(!days[1].large_transaction);
    }

    #[test]
    fn large_withdrawal_is_symmetric() {
        let days = run(
            vec![1000.0, 310.0],
            vec![10.0, 3.0],
            flows_with_tx(vec![0.0, 700.0]),
        );
        assert_relative_eq!(days[1].denominator, 700.0);
        assert_relative_eq!(days[1].gains_losses, 10.0);
    }

    #[test]
    fn zero_prior_and_zero_transaction_gives_zero_ratios() {
        let mut flows = flows_with_tx(vec![0.0, 0.0]);
        flows.dividends[1] = 5.0;
        let days = run(vec![0.0, 0.0], vec![0.0, 0.0], flows);
        assert_eq!(days[1].denominator, 0.0);
        assert_eq!(days[1].dividend_yield, 0.0);
        assert_eq!(days[1].dividends, 5.0);
        assert!(!days[1].large_transaction);
    }

    #[test]
    fn one_denominator_for_all_components() {
        let mut flows = flows_with_tx(vec![0.0, 0.0]);
        flows.dividends[1] = 2.0;
        flows.fees[1] = -1.0;
        flows.taxes[1] = -0.5;
        let days = run(vec![200.0, 204.0], vec![2.0, 2.0], flows);
        let d = days[1];
        assert_relative_eq!(d.price_yield, 0.02);
        assert_relative_eq!(d.dividend_yield, 0.01);
        assert_relative_eq!(d.fee_yield, -0.005);
        assert_relative_eq!(d.tax_yield, -0.0025);
        assert_relative_eq!(d.total_yield(), 0.0225, epsilon = 1e-12);
    }

    #[test]
    fn cash_policy_controls_which_classes_are_excluded() {
        let cal = calendar(2);
        let series = |wkn: &str| BTreeMap::from([(wkn.to_string(), vec![1.0, 1.0])]);
        let mut values = series("cash");
        values.extend(series("tg"));
        values.extend(series("x"));
        let shares = values.clone();

        let no_flows = BTreeMap::new();
        let cash_only = decompose(
            &cal,
            &values,
            &shares,
            &no_flows,
            &registry(),
            CashExclusion::CashOnly,
            0.5,
        );
        assert!(!cash_only.contains("cash"));
        assert!(cash_only.contains("tg"));
        assert!(cash_only.contains("x"));

        let all = decompose(
            &cal,
            &values,
            &shares,
            &no_flows,
            &registry(),
            CashExclusion::AllCashLike,
            0.5,
        );
        assert!(!all.contains("tg"));
        assert!(all.contains("x"));
    }
}
