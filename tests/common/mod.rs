#![allow(dead_code)]

use chrono::NaiveDate;
use depot::domain::booking::Booking;
use depot::domain::error::DepotError;
use depot::domain::instrument::{Instrument, InstrumentClass};
use depot::domain::pipeline::{RunInputs, RunOutput};
use depot::domain::price::PriceQuote;
use depot::ports::ledger_port::LedgerPort;
use depot::ports::price_port::PricePort;
use depot::ports::report_port::ReportPort;
use std::cell::RefCell;

pub struct MockLedgerPort {
    pub instruments: Vec<Instrument>,
    pub bookings: Vec<Booking>,
    pub error: Option<String>,
}

impl MockLedgerPort {
    pub fn new() -> Self {
        Self {
            instruments: Vec::new(),
            bookings: Vec::new(),
            error: None,
        }
    }

    pub fn with_instrument(mut self, wkn: &str, class: InstrumentClass) -> Self {
        self.instruments.push(Instrument::new(wkn, class));
        self
    }

    pub fn with_booking(mut self, booking: Booking) -> Self {
        self.bookings.push(booking);
        self
    }

    pub fn with_error(mut self, reason: &str) -> Self {
        self.error = Some(reason.to_string());
        self
    }

    fn check(&self, table: &str) -> Result<(), DepotError> {
        match &self.error {
            Some(reason) => Err(DepotError::InputLoad {
                table: table.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl LedgerPort for MockLedgerPort {
    fn load_instruments(&self) -> Result<Vec<Instrument>, DepotError> {
        self.check("instruments")?;
        Ok(self.instruments.clone())
    }

    fn load_bookings(&self) -> Result<Vec<Booking>, DepotError> {
        self.check("bookings")?;
        Ok(self.bookings.clone())
    }

    fn fingerprint(&self) -> Result<Vec<Vec<u8>>, DepotError> {
        self.check("bookings")?;
        Ok(vec![
            format!("{:?}", self.instruments).into_bytes(),
            format!("{:?}", self.bookings).into_bytes(),
        ])
    }
}

pub struct MockPricePort {
    pub quotes: Vec<PriceQuote>,
}

impl MockPricePort {
    pub fn new() -> Self {
        Self { quotes: Vec::new() }
    }

    pub fn with_quote(mut self, wkn: &str, date: NaiveDate, price: f64) -> Self {
        self.quotes.push(quote(wkn, date, price));
        self
    }
}

impl PricePort for MockPricePort {
    fn load_prices(&self) -> Result<Vec<PriceQuote>, DepotError> {
        Ok(self.quotes.clone())
    }

    fn fingerprint(&self) -> Result<Vec<Vec<u8>>, DepotError> {
        Ok(vec![format!("{:?}", self.quotes).into_bytes()])
    }
}

/// Records how many runs were written and the total of the last one.
#[derive(Default)]
pub struct MockReportPort {
    pub writes: RefCell<usize>,
    pub last_total: RefCell<Vec<f64>>,
}

impl ReportPort for MockReportPort {
    fn write(&self, output: &RunOutput) -> Result<usize, DepotError> {
        *self.writes.borrow_mut() += 1;
        *self.last_total.borrow_mut() = output.values.total();
        Ok(1)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn quote(wkn: &str, date: NaiveDate, price: f64) -> PriceQuote {
    PriceQuote {
        date,
        wkn: wkn.to_string(),
        price,
    }
}

/// One quote per day from `start`, `prices[i]` on day `i`.
pub fn daily_quotes(wkn: &str, start: NaiveDate, prices: &[f64]) -> Vec<PriceQuote> {
    prices
        .iter()
        .enumerate()
        .map(|(i, p)| quote(wkn, start + chrono::Duration::days(i as i64), *p))
        .collect()
}

pub fn buy(date: NaiveDate, wkn: &str, bank: &str, shares: f64, price: f64) -> Booking {
    Booking::trade(date, wkn, bank, shares, price)
}

pub fn deposit(date: NaiveDate, wkn: &str, bank: &str, amount: f64) -> Booking {
    Booking {
        external_flow: true,
        transaction_value_at_price: None,
        price_at_booking: None,
        ..Booking::trade(date, wkn, bank, amount, 1.0)
    }
}

pub fn transfer_leg(date: NaiveDate, wkn: &str, bank: &str, shares: f64, value: f64, id: &str) -> Booking {
    Booking {
        transaction_value_at_price: Some(value),
        transfer_id: Some(id.to_string()),
        ..Booking::trade(date, wkn, bank, shares, 0.0)
    }
}

/// A security `x`, a cash account and a call-money account.
pub fn standard_instruments() -> Vec<Instrument> {
    vec![
        Instrument::new("x", InstrumentClass::Security),
        Instrument {
            default_price: Some(1.0),
            ..Instrument::new("cash", InstrumentClass::Cash)
        },
        Instrument {
            default_price: Some(1.0),
            ..Instrument::new("tg", InstrumentClass::CallMoney)
        },
    ]
}

pub fn inputs(bookings: Vec<Booking>, prices: Vec<PriceQuote>) -> RunInputs {
    RunInputs {
        instruments: standard_instruments(),
        bookings,
        prices,
    }
}
