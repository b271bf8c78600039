//! CSV table adapter for instruments, bookings and prices.
//!
//! Columns are located by header name (case-insensitive), so column order in
//! the files does not matter and extra columns are ignored.

use crate::domain::booking::Booking;
use crate::domain::error::DepotError;
use crate::domain::instrument::{Instrument, InstrumentClass, normalize_key};
use crate::domain::price::PriceQuote;
use crate::ports::ledger_port::LedgerPort;
use crate::ports::price_port::PricePort;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const BOOKING_COLUMNS: [&str; 9] = [
    "date",
    "wkn",
    "bank",
    "delta_shares",
    "price_at_booking",
    "fees",
    "taxes",
    "interest_dividends",
    "transaction_value_at_price",
];

/// Instrument column prefixes carrying type and region weights.
pub const TYPE_PREFIX: &str = "type ";
pub const REGION_PREFIX: &str = "reg ";

pub struct CsvAdapter {
    instruments_path: PathBuf,
    bookings_path: PathBuf,
    prices_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(instruments_path: PathBuf, bookings_path: PathBuf, prices_path: PathBuf) -> Self {
        Self {
            instruments_path,
            bookings_path,
            prices_path,
        }
    }
}

/// Header-indexed rows of one table.
struct Table {
    name: &'static str,
    headers: Vec<String>,
    records: Vec<csv::StringRecord>,
}

/// A row of a [`Table`] with cell accessors that report table, line and
/// column on failure.
struct Row<'a> {
    table: &'a Table,
    record: &'a csv::StringRecord,
}

fn read_table(path: &Path, name: &'static str) -> Result<Table, DepotError> {
    let content = fs::read_to_string(path)
        .map_err(|e| DepotError::load(name, format!("failed to read {}: {}", path.display(), e)))?;

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let headers = rdr
        .headers()
        .map_err(|e| DepotError::load(name, format!("CSV header error: {}", e)))?
        .iter()
        .map(normalize_key)
        .collect();

    let mut records = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| DepotError::load(name, format!("CSV parse error: {}", e)))?;
        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        records.push(record);
    }

    if records.is_empty() {
        return Err(DepotError::EmptyTable {
            table: name.to_string(),
        });
    }
    debug!(table = name, rows = records.len(), path = %path.display(), "table read");
    Ok(Table {
        name,
        headers,
        records,
    })
}

impl Table {
    fn require(&self, columns: &[&str]) -> Result<(), DepotError> {
        for column in columns {
            if !self.headers.iter().any(|h| h == column) {
                return Err(DepotError::MissingColumn {
                    table: self.name.to_string(),
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }

    fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.records.iter().map(move |record| Row {
            table: self,
            record,
        })
    }
}

impl Row<'_> {
    fn cell(&self, column: &str) -> &str {
        self.table
            .headers
            .iter()
            .position(|h| h == column)
            .and_then(|i| self.record.get(i))
            .unwrap_or("")
    }

    fn invalid(&self, column: &str, reason: String) -> DepotError {
        DepotError::InvalidCell {
            table: self.table.name.to_string(),
            line: self.record.position().map_or(0, |p| p.line()),
            column: column.to_string(),
            reason,
        }
    }

    fn text(&self, column: &str) -> Result<String, DepotError> {
        let value = normalize_key(self.cell(column));
        if value.is_empty() {
            return Err(self.invalid(column, "empty value".into()));
        }
        Ok(value)
    }

    fn optional_text(&self, column: &str) -> Option<String> {
        let value = self.cell(column).trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    fn date(&self, column: &str) -> Result<NaiveDate, DepotError> {
        let raw = self.cell(column);
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|e| self.invalid(column, format!("invalid date '{}': {}", raw, e)))
    }

    fn optional_number(&self, column: &str) -> Result<Option<f64>, DepotError> {
        let raw = self.cell(column);
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<f64>()
            .map(Some)
            .map_err(|e| self.invalid(column, format!("invalid number '{}': {}", raw, e)))
    }

    fn number_or_zero(&self, column: &str) -> Result<f64, DepotError> {
        Ok(self.optional_number(column)?.unwrap_or(0.0))
    }

    /// Nonzero numbers from every column named `<prefix><bucket>`, keyed by
    /// bucket.
    fn weights(&self, prefix: &str) -> Result<BTreeMap<String, f64>, DepotError> {
        let mut weights = BTreeMap::new();
        for header in &self.table.headers {
            let Some(bucket) = header.strip_prefix(prefix) else {
                continue;
            };
            let bucket = bucket.trim();
            if bucket.is_empty() {
                continue;
            }
            if let Some(w) = self.optional_number(header)?.filter(|w| *w != 0.0) {
                *weights.entry(bucket.to_string()).or_insert(0.0) += w;
            }
        }
        Ok(weights)
    }

    fn flag(&self, column: &str) -> Result<bool, DepotError> {
        match self.cell(column).to_lowercase().as_str() {
            "" | "false" | "no" | "0" => Ok(false),
            "true" | "yes" | "1" | "x" => Ok(true),
            other => Err(self.invalid(column, format!("invalid flag '{}'", other))),
        }
    }
}

fn parse_instrument(row: &Row<'_>) -> Result<Instrument, DepotError> {
    let wkn = row.text("wkn")?;
    let class_raw = row.cell("class");
    let class = InstrumentClass::parse(class_raw)
        .ok_or_else(|| row.invalid("class", format!("unknown instrument class '{}'", class_raw)))?;
    Ok(Instrument {
        name: row.optional_text("name").unwrap_or_else(|| wkn.clone()),
        ticker: row.optional_text("ticker"),
        default_price: row.optional_number("default_price")?,
        types: row.weights(TYPE_PREFIX)?,
        regions: row.weights(REGION_PREFIX)?,
        wkn,
        class,
    })
}

fn parse_booking(row: &Row<'_>) -> Result<Booking, DepotError> {
    Ok(Booking {
        date: row.date("date")?,
        wkn: row.text("wkn")?,
        bank: row.text("bank")?,
        delta_shares: row.number_or_zero("delta_shares")?,
        price_at_booking: row.optional_number("price_at_booking")?,
        fees: row.number_or_zero("fees")?,
        taxes: row.number_or_zero("taxes")?,
        interest_dividends: row.number_or_zero("interest_dividends")?,
        transaction_value_at_price: row.optional_number("transaction_value_at_price")?,
        transfer_id: row.optional_text("transfer_id"),
        external_flow: row.flag("external_flow")?,
    })
}

fn parse_quote(row: &Row<'_>) -> Result<PriceQuote, DepotError> {
    let price = row
        .optional_number("price")?
        .ok_or_else(|| row.invalid("price", "empty value".into()))?;
    Ok(PriceQuote {
        date: row.date("date")?,
        wkn: row.text("wkn")?,
        price,
    })
}

fn read_bytes(path: &Path, name: &str) -> Result<Vec<u8>, DepotError> {
    fs::read(path).map_err(|e| DepotError::load(name, format!("failed to read {}: {}", path.display(), e)))
}

impl LedgerPort for CsvAdapter {
    fn load_instruments(&self) -> Result<Vec<Instrument>, DepotError> {
        let table = read_table(&self.instruments_path, "instruments")?;
        table.require(&["wkn", "class"])?;
        table.rows().map(|row| parse_instrument(&row)).collect()
    }

    fn load_bookings(&self) -> Result<Vec<Booking>, DepotError> {
        let table = read_table(&self.bookings_path, "bookings")?;
        table.require(&BOOKING_COLUMNS)?;
        table.rows().map(|row| parse_booking(&row)).collect()
    }

    fn fingerprint(&self) -> Result<Vec<Vec<u8>>, DepotError> {
        Ok(vec![
            read_bytes(&self.instruments_path, "instruments")?,
            read_bytes(&self.bookings_path, "bookings")?,
        ])
    }
}

impl PricePort for CsvAdapter {
    fn load_prices(&self) -> Result<Vec<PriceQuote>, DepotError> {
        let table = read_table(&self.prices_path, "prices")?;
        table.require(&["date", "wkn", "price"])?;
        table.rows().map(|row| parse_quote(&row)).collect()
    }

    fn fingerprint(&self) -> Result<Vec<Vec<u8>>, DepotError> {
        Ok(vec![read_bytes(&self.prices_path, "prices")?])
    }
}
