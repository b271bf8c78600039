//! Bookings and the screened booking ledger.
//!
//! Screening checks every booking against the [`Registry`], fills in missing
//! transaction values and reconciles depot-transfer legs. Bookings that fail
//! a reference check are skipped with a [`DataWarning`]; nothing here aborts
//! a run except an empty result.

use crate::domain::calendar::Calendar;
use crate::domain::diagnostics::{DataWarning, Diagnostics};
use crate::domain::error::DepotError;
use crate::domain::instrument::Registry;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

/// One transaction event as it appears in the bookings table.
#[derive(Debug, Clone, PartialEq)]
pub struct Booking {
    pub date: NaiveDate,
    pub wkn: String,
    pub bank: String,
    pub delta_shares: f64,
    pub price_at_booking: Option<f64>,
    pub fees: f64,
    pub taxes: f64,
    pub interest_dividends: f64,
    /// Signed trade value, `-(delta_shares × price)`.
    pub transaction_value_at_price: Option<f64>,
    /// Groups the legs of a depot transfer.
    pub transfer_id: Option<String>,
    /// Deposit or withdrawal of money into the depot.
    pub external_flow: bool,
}

impl Booking {
    /// A plain trade with no fees, taxes or dividends.
    pub fn trade(date: NaiveDate, wkn: &str, bank: &str, delta_shares: f64, price: f64) -> Self {
        Self {
            date,
            wkn: wkn.to_string(),
            bank: bank.to_string(),
            delta_shares,
            price_at_booking: Some(price),
            fees: 0.0,
            taxes: 0.0,
            interest_dividends: 0.0,
            transaction_value_at_price: Some(-(delta_shares * price)),
            transfer_id: None,
            external_flow: false,
        }
    }

    pub fn is_transfer(&self) -> bool {
        self.transfer_id.is_some()
    }
}

/// A booking accepted by screening, with the transaction value the engine
/// actually uses.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub booking: Booking,
    pub transaction_value: f64,
}

/// Per-day monetary flows of one instrument, banks collapsed.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentFlows {
    pub transaction_value: Vec<f64>,
    pub fees: Vec<f64>,
    pub taxes: Vec<f64>,
    pub dividends: Vec<f64>,
}

impl InstrumentFlows {
    pub fn zeros(len: usize) -> Self {
        Self {
            transaction_value: vec![0.0; len],
            fees: vec![0.0; len],
            taxes: vec![0.0; len],
            dividends: vec![0.0; len],
        }
    }
}

/// Fees, taxes and income booked on one day for one holding.
#[derive(Debug, Clone, PartialEq)]
pub struct BankFlow {
    pub date: NaiveDate,
    pub wkn: String,
    pub bank: String,
    pub fees: f64,
    pub taxes: f64,
    pub interest_dividends: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    /// Screens raw bookings against the registry.
    pub fn screen(
        bookings: &[Booking],
        registry: &Registry,
        transfer_tolerance: f64,
        diag: &mut Diagnostics,
    ) -> Result<Self, DepotError> {
        if bookings.is_empty() {
            return Err(DepotError::EmptyTable {
                table: "bookings".into(),
            });
        }

        let mut entries = Vec::with_capacity(bookings.len());
        for booking in bookings {
            let Some(instrument) = registry.get(&booking.wkn) else {
                diag.push(DataWarning::UnknownInstrument {
                    date: booking.date,
                    wkn: booking.wkn.clone(),
                    bank: booking.bank.clone(),
                });
                continue;
            };
            if !registry.knows_bank(&booking.bank) {
                diag.push(DataWarning::UnknownBank {
                    date: booking.date,
                    wkn: booking.wkn.clone(),
                    bank: booking.bank.clone(),
                });
                continue;
            }

            let transaction_value = match booking.transaction_value_at_price {
                Some(v) => v,
                None if booking.is_transfer()
                    || instrument.class.is_cash_like()
                    || booking.delta_shares == 0.0 =>
                {
                    0.0
                }
                None => {
                    let defaulted = booking
                        .price_at_booking
                        .map(|p| -(booking.delta_shares * p))
                        .unwrap_or(0.0);
                    diag.push(DataWarning::MissingTransactionValue {
                        date: booking.date,
                        wkn: booking.wkn.clone(),
                        bank: booking.bank.clone(),
                        defaulted_to: defaulted,
                    });
                    defaulted
                }
            };

            entries.push(LedgerEntry {
                booking: booking.clone(),
                transaction_value,
            });
        }

        if entries.is_empty() {
            return Err(DepotError::EmptyTable {
                table: "bookings (after screening)".into(),
            });
        }

        entries.sort_by_key(|e| e.booking.date);
        let ledger = Self { entries };
        ledger.reconcile_transfers(transfer_tolerance, diag);
        debug!(accepted = ledger.len(), total = bookings.len(), "ledger screened");
        Ok(ledger)
    }

    /// Checks that the legs of every transfer group net to zero.
    pub fn reconcile_transfers(&self, tolerance: f64, diag: &mut Diagnostics) {
        let mut groups: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
        for entry in &self.entries {
            if let Some(id) = entry.booking.transfer_id.as_deref() {
                let group = groups.entry(id).or_insert((0, 0.0));
                group.0 += 1;
                group.1 += entry.transaction_value;
            }
        }

        for (id, (legs, residual)) in groups {
            if legs < 2 || residual.abs() > tolerance {
                diag.push(DataWarning::UnbalancedTransfer {
                    transfer_id: id.to_string(),
                    legs,
                    residual,
                });
            }
        }
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.entries.first().map(|e| e.booking.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.entries.last().map(|e| e.booking.date)
    }

    /// Daily transaction values, fees, taxes and dividends per `wkn`.
    /// Bookings outside the calendar do not contribute.
    pub fn daily_flows(&self, calendar: &Calendar) -> BTreeMap<String, InstrumentFlows> {
        let mut flows: BTreeMap<String, InstrumentFlows> = BTreeMap::new();
        for entry in &self.entries {
            let b = &entry.booking;
            let Some(i) = calendar.index_of(b.date) else {
                continue;
            };
            let f = flows
                .entry(b.wkn.clone())
                .or_insert_with(|| InstrumentFlows::zeros(calendar.len()));
            f.transaction_value[i] += entry.transaction_value;
            f.fees[i] += b.fees;
            f.taxes[i] += b.taxes;
            f.dividends[i] += b.interest_dividends;
        }
        flows
    }

    /// Fees, taxes and income summed per `(date, wkn, bank)`. Groups where
    /// all three are zero are dropped.
    pub fn bank_flows(&self, calendar: &Calendar) -> Vec<BankFlow> {
        let mut acc: BTreeMap<(NaiveDate, &str, &str), (f64, f64, f64)> = BTreeMap::new();
        for entry in &self.entries {
            let b = &entry.booking;
            if !calendar.contains(b.date) {
                continue;
            }
            let sums = acc
                .entry((b.date, b.wkn.as_str(), b.bank.as_str()))
                .or_insert((0.0, 0.0, 0.0));
            sums.0 += b.fees;
            sums.1 += b.taxes;
            sums.2 += b.interest_dividends;
        }
        acc.into_iter()
            .filter(|(_, (fees, taxes, income))| *fees != 0.0 || *taxes != 0.0 || *income != 0.0)
            .map(|((date, wkn, bank), (fees, taxes, interest_dividends))| BankFlow {
                date,
                wkn: wkn.to_string(),
                bank: bank.to_string(),
                fees,
                taxes,
                interest_dividends,
            })
            .collect()
    }

    /// Money moved into (positive) or out of the depot per day.
    pub fn invest_series(&self, calendar: &Calendar) -> Vec<f64> {
        let mut invest = vec![0.0; calendar.len()];
        for entry in self.entries.iter().filter(|e| e.booking.external_flow) {
            if let Some(i) = calendar.index_of(entry.booking.date) {
                invest[i] += entry.booking.delta_shares;
            }
        }
        invest
    }
}
