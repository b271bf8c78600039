//! Data-quality warnings collected during a run.
//!
//! Warnings never abort a run. Each one is logged when raised; the per-category
//! counts are logged again at the end of the run and exported with the
//! results.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataWarning {
    #[error("booking {date} {wkn}@{bank}: unknown instrument, skipped")]
    UnknownInstrument {
        date: NaiveDate,
        wkn: String,
        bank: String,
    },

    #[error("booking {date} {wkn}@{bank}: unknown bank, skipped")]
    UnknownBank {
        date: NaiveDate,
        wkn: String,
        bank: String,
    },

    #[error(
        "booking {date} {wkn}@{bank}: missing transaction_value_at_price, using {defaulted_to:.2}"
    )]
    MissingTransactionValue {
        date: NaiveDate,
        wkn: String,
        bank: String,
        defaulted_to: f64,
    },

    #[error("transfer '{transfer_id}' ({legs} legs) does not balance: residual {residual:.2}")]
    UnbalancedTransfer {
        transfer_id: String,
        legs: usize,
        residual: f64,
    },

    #[error("{wkn}: no price available from {first_date} on {days} held day(s), valued at 0")]
    MissingPrice {
        wkn: String,
        first_date: NaiveDate,
        days: usize,
    },

    #[error("{wkn}: price forward-filled for {gap_days} days up to {date}")]
    StalePrice {
        wkn: String,
        date: NaiveDate,
        gap_days: i64,
    },

    #[error("{wkn}: prices present but instrument unknown")]
    PricesWithoutInstrument { wkn: String },

    #[error("{wkn}: instrument has neither prices nor a default price")]
    InstrumentWithoutPrices { wkn: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WarningCategory {
    UnknownReference,
    MissingTransactionValue,
    UnbalancedTransfer,
    MissingPrice,
    ForwardFilledPrice,
    PriceCoverage,
}

impl fmt::Display for WarningCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WarningCategory::UnknownReference => "unknown_reference",
            WarningCategory::MissingTransactionValue => "missing_transaction_value",
            WarningCategory::UnbalancedTransfer => "unbalanced_transfer",
            WarningCategory::MissingPrice => "missing_price",
            WarningCategory::ForwardFilledPrice => "forward_filled_price",
            WarningCategory::PriceCoverage => "price_coverage",
        };
        f.write_str(name)
    }
}

impl DataWarning {
    pub fn category(&self) -> WarningCategory {
        match self {
            DataWarning::UnknownInstrument { .. } | DataWarning::UnknownBank { .. } => {
                WarningCategory::UnknownReference
            }
            DataWarning::MissingTransactionValue { .. } => {
                WarningCategory::MissingTransactionValue
            }
            DataWarning::UnbalancedTransfer { .. } => WarningCategory::UnbalancedTransfer,
            DataWarning::MissingPrice { .. } => WarningCategory::MissingPrice,
            DataWarning::StalePrice { .. } => WarningCategory::ForwardFilledPrice,
            DataWarning::PricesWithoutInstrument { .. }
            | DataWarning::InstrumentWithoutPrices { .. } => WarningCategory::PriceCoverage,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    warnings: Vec<DataWarning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: DataWarning) {
        warn!(category = %warning.category(), "{warning}");
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[DataWarning] {
        &self.warnings
    }

    pub fn count(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn count_of(&self, category: WarningCategory) -> usize {
        self.warnings
            .iter()
            .filter(|w| w.category() == category)
            .count()
    }

    pub fn counts_by_category(&self) -> BTreeMap<WarningCategory, usize> {
        let mut counts = BTreeMap::new();
        for w in &self.warnings {
            *counts.entry(w.category()).or_insert(0) += 1;
        }
        counts
    }

    pub fn log_summary(&self) {
        if self.warnings.is_empty() {
            info!("run finished without data-quality warnings");
            return;
        }
        warn!("run finished with {} data-quality warning(s)", self.count());
        for (category, n) in self.counts_by_category() {
            warn!(%category, count = n, "warning summary");
        }
    }
}
