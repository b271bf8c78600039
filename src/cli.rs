//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::{CsvReportAdapter, ExportSelection};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::{
    parse_date, parse_optional_f64, validate_engine_config, validate_files_config,
};
use crate::domain::error::DepotError;
use crate::domain::instrument::CashExclusion;
use crate::domain::pipeline::{self, EngineConfig, RunInputs};
use crate::domain::snapshot::SnapshotId;
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::LedgerPort;
use crate::ports::price_port::PricePort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(
    name = "depot",
    about = "Portfolio positions, valuations and time-weighted returns"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute positions, values, yields and profitability and export them
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Output directory, overrides [files] output_dir
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Last calendar day (YYYY-MM-DD), overrides [engine] end_date
        #[arg(long)]
        end_date: Option<String>,
        /// Ignore and do not update the position cache
        #[arg(long)]
        no_cache: bool,
    },
    /// Load and screen the inputs and print a warning summary
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Delete every cached position series
    ClearCache {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Run {
            config,
            output,
            end_date,
            no_cache,
        } => run_engine(&config, output.as_ref(), end_date.as_deref(), no_cache),
        Command::Check { config } => run_check(&config),
        Command::ClearCache { config } => run_clear_cache(&config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, DepotError> {
    let adapter = FileConfigAdapter::from_file(path)?;
    let level = adapter
        .get_string("logging", "level")
        .unwrap_or_else(|| "info".to_string());
    init_logging(&level);
    info!(path = %path.display(), "config loaded");
    Ok(adapter)
}

/// Installs the stderr subscriber. `RUST_LOG` takes precedence over the
/// configured level. Repeated calls keep the first subscriber.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.trim().to_lowercase()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn build_engine_config(config: &dyn ConfigPort) -> Result<EngineConfig, DepotError> {
    let defaults = EngineConfig::default();

    let end_date = config
        .get_string("engine", "end_date")
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_date(&s, "engine", "end_date"))
        .transpose()?;
    let cash_exclusion = match config.get_string("engine", "cash_exclusion") {
        Some(s) => CashExclusion::parse(&s).ok_or_else(|| DepotError::ConfigInvalid {
            section: "engine".into(),
            key: "cash_exclusion".into(),
            reason: format!("unknown policy '{}'", s),
        })?,
        None => defaults.cash_exclusion,
    };
    let banks = config
        .get_list("banks", "names")
        .filter(|names| !names.is_empty());

    Ok(EngineConfig {
        end_date,
        large_transaction_threshold: parse_optional_f64(
            config,
            "engine",
            "large_transaction_threshold",
        )?
        .unwrap_or(defaults.large_transaction_threshold),
        dust_threshold: parse_optional_f64(config, "engine", "dust_threshold")?
            .unwrap_or(defaults.dust_threshold),
        stale_price_days: config.get_int("engine", "stale_price_days", defaults.stale_price_days),
        transfer_tolerance: parse_optional_f64(config, "engine", "transfer_tolerance")?
            .unwrap_or(defaults.transfer_tolerance),
        cash_exclusion,
        banks,
    })
}

fn required_path(adapter: &FileConfigAdapter, key: &str) -> Result<PathBuf, DepotError> {
    adapter
        .get_string("files", key)
        .map(|p| adapter.resolve_path(&p))
        .ok_or_else(|| DepotError::ConfigMissing {
            section: "files".into(),
            key: key.into(),
        })
}

pub fn build_csv_adapter(adapter: &FileConfigAdapter) -> Result<CsvAdapter, DepotError> {
    Ok(CsvAdapter::new(
        required_path(adapter, "instruments")?,
        required_path(adapter, "bookings")?,
        required_path(adapter, "prices")?,
    ))
}

pub fn load_inputs(
    ledger: &dyn LedgerPort,
    prices: &dyn PricePort,
) -> Result<RunInputs, DepotError> {
    let instruments = ledger.load_instruments()?;
    let bookings = ledger.load_bookings()?;
    let prices = prices.load_prices()?;
    info!(
        instruments = instruments.len(),
        bookings = bookings.len(),
        prices = prices.len(),
        "inputs loaded"
    );
    Ok(RunInputs {
        instruments,
        bookings,
        prices,
    })
}

/// Identity of every input that shapes the cached position series.
pub fn snapshot_for(
    ledger: &dyn LedgerPort,
    prices: &dyn PricePort,
    engine: &EngineConfig,
) -> Result<SnapshotId, DepotError> {
    let mut parts = ledger.fingerprint()?;
    parts.extend(prices.fingerprint()?);
    parts.push(engine.position_fingerprint().into_bytes());
    Ok(SnapshotId::from_parts(parts))
}

/// Loads config and validates it before anything else is touched.
fn prepare(config_path: &Path) -> Result<(FileConfigAdapter, EngineConfig), DepotError> {
    // Stage 1: Load config
    let adapter = load_config(config_path)?;

    // Stage 2: Validate config
    validate_files_config(&adapter)?;
    validate_engine_config(&adapter)?;
    let engine = build_engine_config(&adapter)?;
    Ok((adapter, engine))
}

fn run_engine(
    config_path: &Path,
    output: Option<&PathBuf>,
    end_date: Option<&str>,
    no_cache: bool,
) -> Result<(), DepotError> {
    let (adapter, mut engine) = prepare(config_path)?;
    if let Some(s) = end_date {
        engine.end_date = Some(parse_date(s, "cli", "end-date")?);
    }

    // Stage 3: Load inputs
    let csv = build_csv_adapter(&adapter)?;
    let inputs = load_inputs(&csv, &csv)?;

    // Stage 4: Compute
    let use_cache = !no_cache && adapter.get_bool("cache", "enabled", true);
    let output_run = if use_cache {
        run_with_cache(&adapter, &csv, &inputs, &engine)?
    } else {
        pipeline::run(&inputs, &engine)?
    };

    // Stage 5: Export
    let output_dir = match output {
        Some(dir) => dir.clone(),
        None => adapter.resolve_path(
            &adapter
                .get_string("files", "output_dir")
                .unwrap_or_else(|| "output".to_string()),
        ),
    };
    let report = CsvReportAdapter::new(output_dir.clone(), ExportSelection::from_config(&adapter));
    let written = report.write(&output_run)?;

    println!(
        "{} table(s) written to {} ({} day(s), {} warning(s))",
        written,
        output_dir.display(),
        output_run.calendar.len(),
        output_run.diagnostics.count()
    );
    Ok(())
}

#[cfg(feature = "sqlite")]
fn run_with_cache(
    adapter: &FileConfigAdapter,
    csv: &CsvAdapter,
    inputs: &RunInputs,
    engine: &EngineConfig,
) -> Result<pipeline::RunOutput, DepotError> {
    use crate::adapters::sqlite_adapter::SqliteCacheAdapter;

    let cache = SqliteCacheAdapter::open(&cache_path(adapter))?;
    let snapshot = snapshot_for(csv, csv, engine)?;
    pipeline::run_cached(inputs, engine, &cache, &snapshot)
}

#[cfg(not(feature = "sqlite"))]
fn run_with_cache(
    _adapter: &FileConfigAdapter,
    csv: &CsvAdapter,
    inputs: &RunInputs,
    engine: &EngineConfig,
) -> Result<pipeline::RunOutput, DepotError> {
    let snapshot = snapshot_for(csv, csv, engine)?;
    tracing::warn!(%snapshot, "built without the sqlite feature; position cache disabled");
    pipeline::run(inputs, engine)
}

fn cache_path(adapter: &FileConfigAdapter) -> PathBuf {
    adapter.resolve_path(
        &adapter
            .get_string("cache", "path")
            .unwrap_or_else(|| "depot_cache.sqlite".to_string()),
    )
}

fn run_check(config_path: &Path) -> Result<(), DepotError> {
    let (adapter, engine) = prepare(config_path)?;
    let csv = build_csv_adapter(&adapter)?;
    let inputs = load_inputs(&csv, &csv)?;
    let screened = pipeline::screen(&inputs, &engine)?;

    println!("instruments: {}", screened.registry.len());
    println!(
        "bookings:    {} accepted of {}",
        screened.ledger.len(),
        inputs.bookings.len()
    );
    println!(
        "calendar:    {} to {} ({} days)",
        screened.calendar.start(),
        screened.calendar.end(),
        screened.calendar.len()
    );
    let counts = screened.diagnostics.counts_by_category();
    if counts.is_empty() {
        println!("warnings:    none");
    } else {
        println!("warnings:    {}", screened.diagnostics.count());
        for (category, n) in counts {
            println!("  {category}: {n}");
        }
    }
    Ok(())
}

fn run_clear_cache(config_path: &Path) -> Result<(), DepotError> {
    let adapter = load_config(config_path)?;
    clear_cache(&cache_path(&adapter))
}

#[cfg(feature = "sqlite")]
fn clear_cache(path: &Path) -> Result<(), DepotError> {
    use crate::adapters::sqlite_adapter::SqliteCacheAdapter;
    use crate::ports::cache_port::SeriesCachePort;

    SqliteCacheAdapter::open(path)?.invalidate()?;
    println!("cache cleared: {}", path.display());
    Ok(())
}

#[cfg(not(feature = "sqlite"))]
fn clear_cache(path: &Path) -> Result<(), DepotError> {
    Err(DepotError::Cache {
        reason: format!(
            "sqlite feature is required to clear {}",
            path.display()
        ),
    })
}
