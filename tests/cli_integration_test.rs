//! CLI integration tests with real INI and CSV files on disk.
//!
//! Tests cover:
//! - Config parsing (build_engine_config) from files
//! - The `run` command end to end, including output overrides
//! - The `check` command
//! - Exit codes for config and input failures
//! - Position cache reuse and clearing

mod common;

use depot::adapters::file_config_adapter::FileConfigAdapter;
use depot::cli::{self, Cli, Command};
use depot::domain::error::DepotError;
use depot::domain::instrument::CashExclusion;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tempfile::TempDir;

const INSTRUMENTS: &str = "wkn,name,class,default_price,Type Equity,Reg Europe,Reg USA\nX,World ETF,security,,1,0.4,0.6\nCASH,Cash DKB,cash,1,,,\n";
const BOOKINGS: &str = "date,wkn,bank,delta_shares,price_at_booking,fees,taxes,interest_dividends,transaction_value_at_price,external_flow\n\
2024-01-30,CASH,DKB,2000,,,,,,yes\n\
2024-01-30,X,DKB,10,100,-1,0,0,-1000,\n\
2024-01-30,CASH,DKB,-1001,,,,,,\n\
2024-02-02,X,DKB,0,,0,-2,8,0,\n";
const PRICES: &str = "date,wkn,price\n2024-01-30,X,100\n2024-01-31,X,102\n2024-02-01,X,101\n2024-02-02,X,104\n";

fn code(c: ExitCode) -> String {
    format!("{c:?}")
}

fn expect_code(c: ExitCode, expected: u8) {
    assert_eq!(code(c), code(ExitCode::from(expected)));
}

/// A workspace with the three input tables and a config file pointing at them.
fn workspace(extra: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("instruments.csv"), INSTRUMENTS).unwrap();
    fs::write(dir.path().join("bookings.csv"), BOOKINGS).unwrap();
    fs::write(dir.path().join("prices.csv"), PRICES).unwrap();
    let ini = format!(
        "[files]\ninstruments = instruments.csv\nbookings = bookings.csv\nprices = prices.csv\noutput_dir = out\n\n[cache]\npath = cache.sqlite\n\n[logging]\nlevel = warn\n{extra}"
    );
    let config = dir.path().join("depot.ini");
    fs::write(&config, ini).unwrap();
    (dir, config)
}

fn run_command(config: &Path, output: Option<PathBuf>, no_cache: bool) -> ExitCode {
    cli::run(Cli {
        command: Command::Run {
            config: config.to_path_buf(),
            output,
            end_date: None,
            no_cache,
        },
    })
}

mod config_loading {
    use super::*;

    #[test]
    fn build_engine_config_from_file() {
        let (_dir, config) = workspace(
            "\n[engine]\nend_date = 2024-02-29\nlarge_transaction_threshold = 0.3\ncash_exclusion = cash_like\n",
        );
        let adapter = FileConfigAdapter::from_file(&config).unwrap();
        let engine = cli::build_engine_config(&adapter).unwrap();
        assert_eq!(engine.large_transaction_threshold, 0.3);
        assert_eq!(engine.cash_exclusion, CashExclusion::AllCashLike);
        assert_eq!(engine.end_date.unwrap().to_string(), "2024-02-29");
    }

    #[test]
    fn build_engine_config_rejects_bad_number() {
        let adapter =
            FileConfigAdapter::from_string("[engine]\ndust_threshold = tiny\n").unwrap();
        assert!(matches!(
            cli::build_engine_config(&adapter),
            Err(DepotError::ConfigInvalid { key, .. }) if key == "dust_threshold"
        ));
    }

    #[test]
    fn build_engine_config_rejects_unknown_policy() {
        let adapter =
            FileConfigAdapter::from_string("[engine]\ncash_exclusion = nothing\n").unwrap();
        assert!(cli::build_engine_config(&adapter).is_err());
    }

    #[test]
    fn csv_paths_resolve_against_config_directory() {
        let (_dir, config) = workspace("");
        let adapter = FileConfigAdapter::from_file(&config).unwrap();
        let csv = cli::build_csv_adapter(&adapter).unwrap();
        let inputs = cli::load_inputs(&csv, &csv).unwrap();
        assert_eq!(inputs.instruments.len(), 2);
        assert_eq!(inputs.bookings.len(), 4);
        assert_eq!(inputs.prices.len(), 4);
    }
}

mod run {
    use super::*;

    #[test]
    fn run_writes_every_table() {
        let (dir, config) = workspace("");
        expect_code(run_command(&config, None, true), 0);

        let out = dir.path().join("out");
        for name in [
            "shares_month_banks",
            "values_day",
            "values_month_banks",
            "yield_day",
            "profitability_year",
            "profitability_year_long",
            "overview_day",
            "overview_month",
            "overview_year",
            "depot_statement_month",
            "values_type_month",
            "values_region_month",
            "fees_bank",
            "taxes_bank",
            "interest_dividends_bank",
            "warnings",
        ] {
            assert!(out.join(format!("{name}.csv")).exists(), "{name} missing");
        }

        let fees = fs::read_to_string(out.join("fees_bank.csv")).unwrap();
        assert!(fees.contains("2024-01-30,x,dkb,-1"));
        let taxes = fs::read_to_string(out.join("taxes_bank.csv")).unwrap();
        assert!(taxes.contains("2024-02-02,x,dkb,-2"));

        let pivot = fs::read_to_string(out.join("profitability_year.csv")).unwrap();
        assert!(pivot.starts_with("year,x_days,x_yield\n2024,4,"));
        assert!(!pivot.contains("cash"));
    }

    #[test]
    fn output_flag_overrides_config() {
        let (dir, config) = workspace("");
        let target = dir.path().join("elsewhere");
        expect_code(run_command(&config, Some(target.clone()), true), 0);
        assert!(target.join("values_day.csv").exists());
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn end_date_flag_extends_calendar() {
        let (dir, config) = workspace("");
        let exit = cli::run(Cli {
            command: Command::Run {
                config: config.clone(),
                output: None,
                end_date: Some("2024-02-10".into()),
                no_cache: true,
            },
        });
        expect_code(exit, 0);
        let values = fs::read_to_string(dir.path().join("out/values_day.csv")).unwrap();
        assert_eq!(values.lines().count(), 1 + 12);
        assert!(values.lines().last().unwrap().starts_with("2024-02-10,"));
    }

    #[test]
    fn export_section_disables_tables() {
        let (dir, config) = workspace("\n[export]\nwarnings = false\nyield_day = false\n");
        expect_code(run_command(&config, None, true), 0);
        assert!(!dir.path().join("out/warnings.csv").exists());
        assert!(!dir.path().join("out/yield_day.csv").exists());
        assert!(dir.path().join("out/values_day.csv").exists());
    }

    #[test]
    fn region_breakdown_splits_month_end_value() {
        let (dir, config) = workspace("");
        expect_code(run_command(&config, None, true), 0);
        let regions = fs::read_to_string(dir.path().join("out/values_region_month.csv")).unwrap();
        let jan: Vec<&str> = regions.lines().filter(|l| l.starts_with("2024-01-31,")).collect();
        assert_eq!(jan.len(), 3);
        assert!(jan.iter().any(|l| l.starts_with("2024-01-31,europe,408,")));
        assert!(jan.iter().any(|l| l.starts_with("2024-01-31,unclassified,999,")));
    }

    #[test]
    fn weights_not_adding_up_is_input_error() {
        let (dir, config) = workspace("");
        fs::write(
            dir.path().join("instruments.csv"),
            "wkn,class,reg europe,reg usa\nX,security,0.5,0.4\nCASH,cash,,\n",
        )
        .unwrap();
        expect_code(run_command(&config, None, true), 3);
    }

    #[test]
    fn missing_config_file_is_config_error() {
        expect_code(run_command(Path::new("/nonexistent/depot.ini"), None, true), 2);
    }

    #[test]
    fn missing_files_key_is_config_error() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("depot.ini");
        fs::write(&config, "[files]\ninstruments = instruments.csv\n").unwrap();
        expect_code(run_command(&config, None, true), 2);
    }

    #[test]
    fn invalid_threshold_is_config_error() {
        let (_dir, config) = workspace("\n[engine]\nlarge_transaction_threshold = 0\n");
        expect_code(run_command(&config, None, true), 2);
    }

    #[test]
    fn missing_bookings_column_is_input_error() {
        let (dir, config) = workspace("");
        fs::write(dir.path().join("bookings.csv"), "date,wkn,bank\n2024-01-30,X,DKB\n").unwrap();
        expect_code(run_command(&config, None, true), 3);
    }
}

mod check_command {
    use super::*;

    #[test]
    fn check_succeeds_on_valid_inputs() {
        let (dir, config) = workspace("");
        expect_code(cli::run(Cli { command: Command::Check { config } }), 0);
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn check_reports_empty_bookings() {
        let (dir, config) = workspace("");
        fs::write(
            dir.path().join("bookings.csv"),
            "date,wkn,bank,delta_shares,price_at_booking,fees,taxes,interest_dividends,transaction_value_at_price\n",
        )
        .unwrap();
        expect_code(cli::run(Cli { command: Command::Check { config } }), 3);
    }
}

#[cfg(feature = "sqlite")]
mod cache {
    use super::*;
    use depot::adapters::sqlite_adapter::SqliteCacheAdapter;

    #[test]
    fn run_populates_and_reuses_cache() {
        let (dir, config) = workspace("");
        expect_code(run_command(&config, None, false), 0);

        let cache_path = dir.path().join("cache.sqlite");
        assert!(cache_path.exists());
        let rows = SqliteCacheAdapter::open(&cache_path).unwrap().row_count().unwrap();
        assert!(rows > 0);

        let first = fs::read_to_string(dir.path().join("out/values_day.csv")).unwrap();
        expect_code(run_command(&config, None, false), 0);
        let second = fs::read_to_string(dir.path().join("out/values_day.csv")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn no_cache_flag_leaves_cache_untouched() {
        let (dir, config) = workspace("");
        expect_code(run_command(&config, None, true), 0);
        assert!(!dir.path().join("cache.sqlite").exists());
    }

    #[test]
    fn clear_cache_empties_it() {
        let (dir, config) = workspace("");
        expect_code(run_command(&config, None, false), 0);
        expect_code(
            cli::run(Cli {
                command: Command::ClearCache { config },
            }),
            0,
        );
        let cache = SqliteCacheAdapter::open(&dir.path().join("cache.sqlite")).unwrap();
        assert_eq!(cache.row_count().unwrap(), 0);
    }
}
