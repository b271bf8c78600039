//! End-to-end engine run over one immutable input snapshot.
//!
//! Stages run strictly in order: registry and ledger screening, positions,
//! valuation, yield decomposition, profitability, overview. No I/O happens
//! inside a stage; the optional position cache is consulted only between
//! screening and valuation.

use crate::domain::allocation::{AllocationRow, Dimension, allocation};
use crate::domain::booking::{BankFlow, Booking, Ledger};
use crate::domain::calendar::Calendar;
use crate::domain::diagnostics::Diagnostics;
use crate::domain::error::DepotError;
use crate::domain::instrument::{CashExclusion, Instrument, Registry};
use crate::domain::overview::{BankStatementRow, Overview, depot_statement};
use crate::domain::position::{DEFAULT_DUST_THRESHOLD, PositionSeries, build_positions};
use crate::domain::price::{PriceQuote, PriceSeries};
use crate::domain::profitability::{ProfitabilityTable, aggregate};
use crate::domain::snapshot::SnapshotId;
use crate::domain::valuation::{ValueSeries, build_values, unrealized_gains};
use crate::domain::yields::{DEFAULT_LARGE_TRANSACTION_THRESHOLD, YieldSeries, decompose};
use crate::ports::cache_port::SeriesCachePort;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Last calendar day. Defaults to the later of the last price and the
    /// last booking date.
    pub end_date: Option<NaiveDate>,
    pub large_transaction_threshold: f64,
    pub dust_threshold: f64,
    pub stale_price_days: i64,
    pub transfer_tolerance: f64,
    pub cash_exclusion: CashExclusion,
    /// Bank allow-list; `None` accepts every bank.
    pub banks: Option<Vec<String>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            end_date: None,
            large_transaction_threshold: DEFAULT_LARGE_TRANSACTION_THRESHOLD,
            dust_threshold: DEFAULT_DUST_THRESHOLD,
            stale_price_days: 7,
            transfer_tolerance: 0.01,
            cash_exclusion: CashExclusion::CashOnly,
            banks: None,
        }
    }
}

impl EngineConfig {
    /// Parameters that change the position series, as snapshot input.
    pub fn position_fingerprint(&self) -> String {
        format!(
            "end={:?};dust={};banks={:?}",
            self.end_date, self.dust_threshold, self.banks
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunInputs {
    pub instruments: Vec<Instrument>,
    pub bookings: Vec<Booking>,
    pub prices: Vec<PriceQuote>,
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub calendar: Calendar,
    pub registry: Registry,
    pub positions: PositionSeries,
    pub values: ValueSeries,
    pub yields: YieldSeries,
    pub profitability: ProfitabilityTable,
    pub unrealized: BTreeMap<String, Vec<f64>>,
    pub overview: Overview,
    pub depot_statement: Vec<BankStatementRow>,
    /// Month-end value per asset type.
    pub allocation_type: Vec<AllocationRow>,
    /// Month-end value per region.
    pub allocation_region: Vec<AllocationRow>,
    pub bank_flows: Vec<BankFlow>,
    pub diagnostics: Diagnostics,
}

/// Inputs screened and ready for position building.
#[derive(Debug, Clone)]
pub struct Screened {
    pub registry: Registry,
    pub ledger: Ledger,
    pub prices: PriceSeries,
    pub calendar: Calendar,
    pub diagnostics: Diagnostics,
}

/// Builds the registry, screens the ledger, checks price coverage and fixes
/// the calendar.
pub fn screen(inputs: &RunInputs, config: &EngineConfig) -> Result<Screened, DepotError> {
    let mut diagnostics = Diagnostics::new();

    let registry = Registry::new(inputs.instruments.clone(), config.banks.clone())?;
    let ledger = Ledger::screen(
        &inputs.bookings,
        &registry,
        config.transfer_tolerance,
        &mut diagnostics,
    )?;
    info!(
        instruments = registry.len(),
        bookings = ledger.len(),
        "inputs screened"
    );

    let prices = PriceSeries::from_quotes(&inputs.prices).with_defaults(&registry);
    prices.check_coverage(&registry, &mut diagnostics);

    let calendar = calendar_for(&ledger, &prices, config)?;
    info!(start = %calendar.start(), end = %calendar.end(), days = calendar.len(), "calendar fixed");

    Ok(Screened {
        registry,
        ledger,
        prices,
        calendar,
        diagnostics,
    })
}

fn calendar_for(
    ledger: &Ledger,
    prices: &PriceSeries,
    config: &EngineConfig,
) -> Result<Calendar, DepotError> {
    let (Some(start), Some(last_booking)) = (ledger.first_date(), ledger.last_date()) else {
        return Err(DepotError::EmptyTable {
            table: "bookings".into(),
        });
    };
    let end = config.end_date.unwrap_or_else(|| {
        prices
            .last_date()
            .map_or(last_booking, |p| p.max(last_booking))
    });
    Calendar::new(start, end)
}

/// Runs every stage without a cache.
pub fn run(inputs: &RunInputs, config: &EngineConfig) -> Result<RunOutput, DepotError> {
    let screened = screen(inputs, config)?;
    let positions = build_positions(&screened.ledger, &screened.calendar, config.dust_threshold);
    Ok(finish(screened, positions, config))
}

/// Runs every stage, reusing cached positions stored under `snapshot`.
pub fn run_cached(
    inputs: &RunInputs,
    config: &EngineConfig,
    cache: &dyn SeriesCachePort,
    snapshot: &SnapshotId,
) -> Result<RunOutput, DepotError> {
    let screened = screen(inputs, config)?;

    let cached = cache
        .load_positions(snapshot)?
        .filter(|p| *p.calendar() == screened.calendar);
    let positions = match cached {
        Some(p) => {
            info!(%snapshot, "positions loaded from cache");
            p
        }
        None => {
            let p = build_positions(&screened.ledger, &screened.calendar, config.dust_threshold);
            cache.store_positions(snapshot, &p)?;
            info!(%snapshot, "positions computed and cached");
            p
        }
    };

    Ok(finish(screened, positions, config))
}

fn finish(screened: Screened, positions: PositionSeries, config: &EngineConfig) -> RunOutput {
    let Screened {
        registry,
        ledger,
        prices,
        calendar,
        mut diagnostics,
    } = screened;

    let values = build_values(&positions, &prices, config.stale_price_days, &mut diagnostics);
    info!(holdings = positions.len(), "valuation complete");

    let shares_by_wkn = positions.by_instrument();
    let values_by_wkn = values.by_instrument();
    let flows = ledger.daily_flows(&calendar);
    let yields = decompose(
        &calendar,
        &values_by_wkn,
        &shares_by_wkn,
        &flows,
        &registry,
        config.cash_exclusion,
        config.large_transaction_threshold,
    );

    let profitability = aggregate(&yields, &shares_by_wkn);
    if profitability.is_empty() {
        warn!("no instrument was held on any day; profitability table is empty");
    }

    let unrealized = unrealized_gains(&shares_by_wkn, &prices, &calendar);
    let invest = ledger.invest_series(&calendar);
    let overview = Overview::build(&values, &registry, &unrealized, &invest);
    let depot_statement = depot_statement(&values, &registry);
    let allocation_type = allocation(&values, &registry, Dimension::Type);
    let allocation_region = allocation(&values, &registry, Dimension::Region);
    let bank_flows = ledger.bank_flows(&calendar);

    diagnostics.log_summary();

    RunOutput {
        calendar,
        registry,
        positions,
        values,
        yields,
        profitability,
        unrealized,
        overview,
        depot_statement,
        allocation_type,
        allocation_region,
        bank_flows,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::InstrumentClass;
    use crate::domain::position::HoldingKey;
    use std::cell::RefCell;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn inputs() -> RunInputs {
        RunInputs {
            instruments: vec![
                Instrument::new("x", InstrumentClass::Security),
                Instrument::new("cash", InstrumentClass::Cash),
            ],
            bookings: vec![
                Booking::trade(d(1), "x", "a", 10.0, 100.0),
                Booking::trade(d(3), "x", "a", 5.0, 110.0),
            ],
            prices: vec![
                PriceQuote {
                    date: d(1),
                    wkn: "x".into(),
                    price: 100.0,
                },
                PriceQuote {
                    date: d(5),
                    wkn: "x".into(),
                    price: 120.0,
                },
            ],
        }
    }

    #[derive(Default)]
    struct MemoryCache {
        stored: RefCell<Option<(SnapshotId, PositionSeries)>>,
        stores: RefCell<usize>,
    }

    impl SeriesCachePort for MemoryCache {
        fn load_positions(
            &self,
            snapshot: &SnapshotId,
        ) -> Result<Option<PositionSeries>, DepotError> {
            Ok(self
                .stored
                .borrow()
                .as_ref()
                .filter(|(id, _)| id == snapshot)
                .map(|(_, p)| p.clone()))
        }

        fn store_positions(
            &self,
            snapshot: &SnapshotId,
            positions: &PositionSeries,
        ) -> Result<(), DepotError> {
            *self.stored.borrow_mut() = Some((snapshot.clone(), positions.clone()));
            *self.stores.borrow_mut() += 1;
            Ok(())
        }

        fn invalidate(&self) -> Result<(), DepotError> {
            *self.stored.borrow_mut() = None;
            Ok(())
        }
    }

    #[test]
    fn calendar_runs_to_last_price_by_default() {
        let out = run(&inputs(), &EngineConfig::default()).unwrap();
        assert_eq!(out.calendar.start(), d(1));
        assert_eq!(out.calendar.end(), d(5));
    }

    #[test]
    fn configured_end_date_wins() {
        let config = EngineConfig {
            end_date: Some(d(10)),
            ..EngineConfig::default()
        };
        let out = run(&inputs(), &config).unwrap();
        assert_eq!(out.calendar.end(), d(10));
        assert_eq!(
            out.values.value_on(&HoldingKey::new("x", "a"), d(10)),
            Some(15.0 * 120.0)
        );
    }

    #[test]
    fn end_before_first_booking_is_invalid_range() {
        let config = EngineConfig {
            end_date: NaiveDate::from_ymd_opt(2024, 5, 1),
            ..EngineConfig::default()
        };
        assert!(matches!(
            run(&inputs(), &config),
            Err(DepotError::InvalidRange { .. })
        ));
    }

    #[test]
    fn empty_bookings_is_structural_error() {
        let mut i = inputs();
        i.bookings.clear();
        assert!(matches!(
            run(&i, &EngineConfig::default()),
            Err(DepotError::EmptyTable { .. })
        ));
    }

    #[test]
    fn empty_instruments_is_structural_error() {
        let mut i = inputs();
        i.instruments.clear();
        assert!(matches!(
            run(&i, &EngineConfig::default()),
            Err(DepotError::EmptyTable { table }) if table == "instruments"
        ));
    }

    #[test]
    fn cached_run_reuses_positions_for_same_snapshot() {
        let cache = MemoryCache::default();
        let snapshot = SnapshotId::from_parts(["v1"]);
        let first = run_cached(&inputs(), &EngineConfig::default(), &cache, &snapshot).unwrap();
        let second = run_cached(&inputs(), &EngineConfig::default(), &cache, &snapshot).unwrap();
        assert_eq!(*cache.stores.borrow(), 1);
        assert_eq!(first.positions, second.positions);

        let changed = SnapshotId::from_parts(["v2"]);
        run_cached(&inputs(), &EngineConfig::default(), &cache, &changed).unwrap();
        assert_eq!(*cache.stores.borrow(), 2);
    }

    #[test]
    fn run_reports_allocation_and_bank_flows() {
        let mut i = inputs();
        i.instruments[0].regions = BTreeMap::from([("europe".to_string(), 1.0)]);
        i.bookings[1].fees = -2.5;
        let out = run(&i, &EngineConfig::default()).unwrap();

        assert_eq!(out.allocation_region.len(), 1);
        assert_eq!(out.allocation_region[0].bucket, "europe");
        assert_eq!(out.allocation_region[0].value, 15.0 * 120.0);
        assert_eq!(out.allocation_region[0].share, 1.0);
        assert_eq!(out.allocation_type[0].bucket, crate::domain::allocation::UNCLASSIFIED);

        assert_eq!(out.bank_flows.len(), 1);
        assert_eq!(out.bank_flows[0].date, d(3));
        assert_eq!(out.bank_flows[0].fees, -2.5);
    }

    #[test]
    fn position_fingerprint_tracks_dust_threshold() {
        let a = EngineConfig::default();
        let b = EngineConfig {
            dust_threshold: 0.01,
            ..EngineConfig::default()
        };
        assert_ne!(a.position_fingerprint(), b.position_fingerprint());
    }
}
