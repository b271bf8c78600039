//! Domain error types.
//!
//! Structural problems (unreadable or malformed input tables, invalid
//! configuration) are `DepotError`s and stop a run. Data-quality problems are
//! collected as [`crate::domain::diagnostics::DataWarning`] instead.

/// Top-level error type for depot.
#[derive(Debug, thiserror::Error)]
pub enum DepotError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("failed to load {table} table: {reason}")]
    InputLoad { table: String, reason: String },

    #[error("{table} table is empty")]
    EmptyTable { table: String },

    #[error("{table} table is missing required column '{column}'")]
    MissingColumn { table: String, column: String },

    #[error("{table} table line {line}, column '{column}': {reason}")]
    InvalidCell {
        table: String,
        line: u64,
        column: String,
        reason: String,
    },

    #[error("invalid instrument '{wkn}': {reason}")]
    InvalidInstrument { wkn: String, reason: String },

    #[error("invalid date range: {start} to {end}")]
    InvalidRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("duplicate output column '{column}'")]
    DuplicateColumn { column: String },

    #[error("cache error: {reason}")]
    Cache { reason: String },

    #[error("export error: {reason}")]
    Export { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DepotError {
    pub(crate) fn load(table: &str, reason: impl ToString) -> Self {
        DepotError::InputLoad {
            table: table.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<&DepotError> for std::process::ExitCode {
    fn from(err: &DepotError) -> Self {
        let code: u8 = match err {
            DepotError::Io(_) => 1,
            DepotError::ConfigParse { .. }
            | DepotError::ConfigMissing { .. }
            | DepotError::ConfigInvalid { .. } => 2,
            DepotError::InputLoad { .. }
            | DepotError::EmptyTable { .. }
            | DepotError::MissingColumn { .. }
            | DepotError::InvalidCell { .. }
            | DepotError::InvalidInstrument { .. }
            | DepotError::InvalidRange { .. }
            | DepotError::DuplicateColumn { .. } => 3,
            DepotError::Cache { .. } => 4,
            DepotError::Export { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
