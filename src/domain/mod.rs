//! Core domain types and logic.

pub mod allocation;
pub mod booking;
pub mod calendar;
pub mod config_validation;
pub mod diagnostics;
pub mod error;
pub mod instrument;
pub mod overview;
pub mod pipeline;
pub mod position;
pub mod price;
pub mod profitability;
pub mod snapshot;
pub mod valuation;
pub mod yields;
