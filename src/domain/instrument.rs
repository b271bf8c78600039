//! Instruments, instrument classes and the instrument registry.

use crate::domain::error::DepotError;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Classification that decides whether an instrument is yield-bearing in the
/// standard sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstrumentClass {
    Security,
    Cash,
    CallMoney,
    FixedTermDeposit,
}

impl InstrumentClass {
    /// Parses a class cell. An empty cell is an ordinary security.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "" | "security" => Some(InstrumentClass::Security),
            "cash" => Some(InstrumentClass::Cash),
            "call_money" | "cm" => Some(InstrumentClass::CallMoney),
            "fixed_term_deposit" | "ftd" => Some(InstrumentClass::FixedTermDeposit),
            _ => None,
        }
    }

    pub fn is_cash_like(self) -> bool {
        !matches!(self, InstrumentClass::Security)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstrumentClass::Security => "security",
            InstrumentClass::Cash => "cash",
            InstrumentClass::CallMoney => "call_money",
            InstrumentClass::FixedTermDeposit => "fixed_term_deposit",
        }
    }
}

impl fmt::Display for InstrumentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which instrument classes are removed before yield decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CashExclusion {
    /// Only plain cash accounts.
    #[default]
    CashOnly,
    /// Cash, call money and fixed-term deposits.
    AllCashLike,
}

impl CashExclusion {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "cash" => Some(CashExclusion::CashOnly),
            "cash_like" => Some(CashExclusion::AllCashLike),
            _ => None,
        }
    }

    pub fn excludes(self, class: InstrumentClass) -> bool {
        match self {
            CashExclusion::CashOnly => class == InstrumentClass::Cash,
            CashExclusion::AllCashLike => class.is_cash_like(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub wkn: String,
    pub name: String,
    pub ticker: Option<String>,
    pub class: InstrumentClass,
    /// Constant value used when no quote exists on or before a date.
    pub default_price: Option<f64>,
    /// Fraction of the value attributed to each asset type. Empty, or
    /// summing to one.
    pub types: BTreeMap<String, f64>,
    /// Fraction of the value attributed to each region. Empty, or summing
    /// to one.
    pub regions: BTreeMap<String, f64>,
}

impl Instrument {
    pub fn new(wkn: &str, class: InstrumentClass) -> Self {
        Self {
            wkn: normalize_key(wkn),
            name: String::new(),
            ticker: None,
            class,
            default_price: None,
            types: BTreeMap::new(),
            regions: BTreeMap::new(),
        }
    }
}

const WEIGHT_TOLERANCE: f64 = 1e-6;

fn check_weights(wkn: &str, label: &str, weights: &BTreeMap<String, f64>) -> Result<(), DepotError> {
    if weights.is_empty() {
        return Ok(());
    }
    if let Some((bucket, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
        return Err(DepotError::InvalidInstrument {
            wkn: wkn.to_string(),
            reason: format!("{} weight '{}' is {}", label, bucket, w),
        });
    }
    let sum: f64 = weights.values().sum();
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(DepotError::InvalidInstrument {
            wkn: wkn.to_string(),
            reason: format!("{} weights sum to {:.6}, expected 1", label, sum),
        });
    }
    Ok(())
}

/// Trims and lower-cases identifiers so that `wkn` and bank names compare
/// equal across tables.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Unique instruments by `wkn`, plus an optional bank allow-list.
#[derive(Debug, Clone)]
pub struct Registry {
    instruments: BTreeMap<String, Instrument>,
    banks: Option<BTreeSet<String>>,
}

impl Registry {
    pub fn new(
        instruments: Vec<Instrument>,
        banks: Option<Vec<String>>,
    ) -> Result<Self, DepotError> {
        if instruments.is_empty() {
            return Err(DepotError::EmptyTable {
                table: "instruments".into(),
            });
        }

        let mut map = BTreeMap::new();
        for mut instrument in instruments {
            instrument.wkn = normalize_key(&instrument.wkn);
            if instrument.wkn.is_empty() {
                return Err(DepotError::InvalidInstrument {
                    wkn: String::new(),
                    reason: "empty wkn".into(),
                });
            }
            if map.contains_key(&instrument.wkn) {
                return Err(DepotError::InvalidInstrument {
                    wkn: instrument.wkn,
                    reason: "duplicate wkn".into(),
                });
            }
            check_weights(&instrument.wkn, "type", &instrument.types)?;
            check_weights(&instrument.wkn, "region", &instrument.regions)?;
            map.insert(instrument.wkn.clone(), instrument);
        }

        let banks = banks.map(|names| {
            names
                .iter()
                .map(|b| normalize_key(b))
                .filter(|b| !b.is_empty())
                .collect()
        });

        Ok(Self {
            instruments: map,
            banks,
        })
    }

    pub fn get(&self, wkn: &str) -> Option<&Instrument> {
        self.instruments.get(wkn)
    }

    pub fn contains(&self, wkn: &str) -> bool {
        self.instruments.contains_key(wkn)
    }

    /// Any bank is known when no allow-list is configured.
    pub fn knows_bank(&self, bank: &str) -> bool {
        match &self.banks {
            Some(allowed) => allowed.contains(bank),
            None => true,
        }
    }

    pub fn class_of(&self, wkn: &str) -> Option<InstrumentClass> {
        self.get(wkn).map(|i| i.class)
    }

    /// True when the instrument is removed from yield decomposition under
    /// `policy`. Unknown instruments are excluded.
    pub fn is_excluded(&self, wkn: &str, policy: CashExclusion) -> bool {
        self.class_of(wkn).is_none_or(|c| policy.excludes(c))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.values()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}
