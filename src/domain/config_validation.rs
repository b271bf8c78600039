//! Configuration validation.
//!
//! Validates every config field before any input table is loaded.

use crate::domain::error::DepotError;
use crate::domain::instrument::CashExclusion;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

pub fn validate_files_config(config: &dyn ConfigPort) -> Result<(), DepotError> {
    for key in ["instruments", "bookings", "prices"] {
        require_non_empty(config, "files", key)?;
    }
    if config
        .get_string("files", "output_dir")
        .is_some_and(|dir| dir.trim().is_empty())
    {
        return Err(invalid("files", "output_dir", "output_dir must not be empty"));
    }
    Ok(())
}

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), DepotError> {
    validate_end_date(config)?;
    validate_threshold(config)?;
    validate_non_negative(config, "dust_threshold")?;
    validate_non_negative(config, "transfer_tolerance")?;
    validate_stale_price_days(config)?;
    validate_cash_exclusion(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn require_non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), DepotError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(DepotError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn invalid(section: &str, key: &str, reason: &str) -> DepotError {
    DepotError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Parses an optional numeric key. A present but unparsable value is an
/// error rather than a silent fallback to the default.
pub fn parse_optional_f64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<f64>, DepotError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| invalid(section, key, &format!("'{}' is not a number", s.trim()))),
    }
}

pub fn parse_date(value: &str, section: &str, key: &str) -> Result<NaiveDate, DepotError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| invalid(section, key, &format!("invalid {key} format, expected YYYY-MM-DD")))
}

fn validate_end_date(config: &dyn ConfigPort) -> Result<(), DepotError> {
    if let Some(s) = config.get_string("engine", "end_date") {
        parse_date(&s, "engine", "end_date")?;
    }
    Ok(())
}

fn validate_threshold(config: &dyn ConfigPort) -> Result<(), DepotError> {
    let value = parse_optional_f64(config, "engine", "large_transaction_threshold")?;
    if value.is_some_and(|v| v <= 0.0) {
        return Err(invalid(
            "engine",
            "large_transaction_threshold",
            "large_transaction_threshold must be positive",
        ));
    }
    Ok(())
}

fn validate_non_negative(config: &dyn ConfigPort, key: &str) -> Result<(), DepotError> {
    if parse_optional_f64(config, "engine", key)?.is_some_and(|v| v < 0.0) {
        return Err(invalid("engine", key, &format!("{key} must be non-negative")));
    }
    Ok(())
}

fn validate_stale_price_days(config: &dyn ConfigPort) -> Result<(), DepotError> {
    if let Some(s) = config.get_string("engine", "stale_price_days") {
        match s.trim().parse::<i64>() {
            Ok(v) if v >= 0 => {}
            _ => {
                return Err(invalid(
                    "engine",
                    "stale_price_days",
                    "stale_price_days must be a non-negative integer",
                ));
            }
        }
    }
    Ok(())
}

fn validate_cash_exclusion(config: &dyn ConfigPort) -> Result<(), DepotError> {
    if config
        .get_string("engine", "cash_exclusion")
        .is_some_and(|s| CashExclusion::parse(&s).is_none())
    {
        return Err(invalid(
            "engine",
            "cash_exclusion",
            "cash_exclusion must be 'cash' or 'cash_like'",
        ));
    }
    Ok(())
}

fn validate_log_level(config: &dyn ConfigPort) -> Result<(), DepotError> {
    if config
        .get_string("logging", "level")
        .is_some_and(|s| !LOG_LEVELS.contains(&s.trim().to_lowercase().as_str()))
    {
        return Err(invalid(
            "logging",
            "level",
            "level must be one of trace, debug, info, warn, error",
        ));
    }
    Ok(())
}
