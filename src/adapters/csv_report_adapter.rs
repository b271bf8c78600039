//! CSV export of run results.

use crate::domain::allocation::AllocationRow;
use crate::domain::booking::BankFlow;
use crate::domain::calendar::Period;
use crate::domain::error::DepotError;
use crate::domain::overview::OverviewRow;
use crate::domain::pipeline::RunOutput;
use crate::ports::config_port::ConfigPort;
use crate::ports::report_port::ReportPort;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Which tables to export. Everything is on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSelection {
    pub shares_month_banks: bool,
    pub values_day: bool,
    pub values_month_banks: bool,
    pub yield_day: bool,
    pub profitability_year: bool,
    pub overview: bool,
    pub depot_statement: bool,
    /// Month-end type and region breakdown.
    pub allocation: bool,
    /// Fees, taxes and income per bank.
    pub bank_flows: bool,
    pub warnings: bool,
}

impl Default for ExportSelection {
    fn default() -> Self {
        Self {
            shares_month_banks: true,
            values_day: true,
            values_month_banks: true,
            yield_day: true,
            profitability_year: true,
            overview: true,
            depot_statement: true,
            allocation: true,
            bank_flows: true,
            warnings: true,
        }
    }
}

impl ExportSelection {
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let on = |key: &str| config.get_bool("export", key, true);
        Self {
            shares_month_banks: on("shares_month_banks"),
            values_day: on("values_day"),
            values_month_banks: on("values_month_banks"),
            yield_day: on("yield_day"),
            profitability_year: on("profitability_year"),
            overview: on("overview"),
            depot_statement: on("depot_statement"),
            allocation: on("allocation"),
            bank_flows: on("bank_flows"),
            warnings: on("warnings"),
        }
    }
}

pub struct CsvReportAdapter {
    output_dir: PathBuf,
    selection: ExportSelection,
}

fn export_err(path: &Path, e: impl std::fmt::Display) -> DepotError {
    DepotError::Export {
        reason: format!("{}: {}", path.display(), e),
    }
}

/// Writes one CSV file from a header and string rows.
fn write_table<I>(path: &Path, header: &[String], rows: I) -> Result<(), DepotError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut wtr = csv::Writer::from_path(path).map_err(|e| export_err(path, e))?;
    wtr.write_record(header).map_err(|e| export_err(path, e))?;
    for row in rows {
        wtr.write_record(&row).map_err(|e| export_err(path, e))?;
    }
    wtr.flush().map_err(|e| export_err(path, e))?;
    Ok(())
}

fn header(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn num(v: f64) -> String {
    v.to_string()
}

fn overview_rows(rows: Vec<OverviewRow>) -> impl Iterator<Item = Vec<String>> {
    rows.into_iter().map(|r| {
        vec![
            r.date.to_string(),
            num(r.non_cash),
            num(r.cash_like),
            num(r.unrealized_gains_losses),
            num(r.invest),
        ]
    })
}

fn allocation_rows(rows: &[AllocationRow]) -> impl Iterator<Item = Vec<String>> + '_ {
    rows.iter()
        .map(|r| vec![r.date.to_string(), r.bucket.clone(), num(r.value), num(r.share)])
}

/// Rows of `flows` whose `amount` is nonzero.
fn bank_flow_rows(
    flows: &[BankFlow],
    amount: fn(&BankFlow) -> f64,
) -> impl Iterator<Item = Vec<String>> + '_ {
    flows.iter().filter(move |f| amount(f) != 0.0).map(move |f| {
        vec![
            f.date.to_string(),
            f.wkn.clone(),
            f.bank.clone(),
            num(amount(f)),
        ]
    })
}

impl CsvReportAdapter {
    pub fn new(output_dir: PathBuf, selection: ExportSelection) -> Self {
        Self {
            output_dir,
            selection,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{name}.csv"))
    }

    fn write_shares_month_banks(&self, out: &RunOutput) -> Result<(), DepotError> {
        let rows = out
            .positions
            .sample(Period::Month)
            .into_iter()
            .map(|(date, key, shares)| vec![date.to_string(), key.wkn, key.bank, num(shares)]);
        write_table(
            &self.path("shares_month_banks"),
            &header(&["date", "wkn", "bank", "shares"]),
            rows,
        )
    }

    fn write_values_day(&self, out: &RunOutput) -> Result<(), DepotError> {
        let by_wkn = out.values.by_instrument();
        let total = out.values.total();
        let mut cols = vec!["date".to_string()];
        cols.extend(by_wkn.keys().cloned());
        cols.push("total".to_string());

        let rows = out.calendar.dates().enumerate().map(|(i, date)| {
            let mut row = vec![date.to_string()];
            row.extend(by_wkn.values().map(|v| num(v[i])));
            row.push(num(total[i]));
            row
        });
        write_table(&self.path("values_day"), &cols, rows)
    }

    fn write_values_month_banks(&self, out: &RunOutput) -> Result<(), DepotError> {
        let rows = out
            .values
            .sample(Period::Month)
            .into_iter()
            .map(|(date, key, value)| vec![date.to_string(), key.wkn, key.bank, num(value)]);
        write_table(
            &self.path("values_month_banks"),
            &header(&["date", "wkn", "bank", "value"]),
            rows,
        )
    }

    /// Only days with a nonzero component are written.
    fn write_yield_day(&self, out: &RunOutput) -> Result<(), DepotError> {
        let mut rows = Vec::new();
        for (wkn, days) in out.yields.iter() {
            for (i, d) in days.iter().enumerate().filter(|(_, d)| d.is_active()) {
                rows.push(vec![
                    out.calendar.date_at(i).to_string(),
                    wkn.clone(),
                    num(d.gains_losses),
                    num(d.dividends),
                    num(d.fees),
                    num(d.taxes),
                    num(d.denominator),
                    d.large_transaction.to_string(),
                    num(d.price_yield),
                    num(d.dividend_yield),
                    num(d.fee_yield),
                    num(d.tax_yield),
                    num(d.total_yield()),
                ]);
            }
        }
        rows.sort();
        write_table(
            &self.path("yield_day"),
            &header(&[
                "date",
                "wkn",
                "gains_losses",
                "dividends",
                "fees",
                "taxes",
                "denominator",
                "large_transaction",
                "price_yield",
                "dividend_yield",
                "fee_yield",
                "tax_yield",
                "total_yield",
            ]),
            rows,
        )
    }

    fn write_profitability(&self, out: &RunOutput) -> Result<(), DepotError> {
        let pivot = out.profitability.pivot()?;
        let mut cols = vec!["year".to_string()];
        cols.extend(pivot.columns.iter().cloned());
        let rows = pivot.rows.iter().map(|r| {
            let mut row = vec![r.year.to_string()];
            row.extend(r.cells.iter().map(|c| c.map(num).unwrap_or_default()));
            row
        });
        write_table(&self.path("profitability_year"), &cols, rows)?;

        let long = out.profitability.rows().iter().map(|r| {
            vec![
                r.year.to_string(),
                r.wkn.clone(),
                r.days_held.to_string(),
                num(r.annual_yield),
            ]
        });
        write_table(
            &self.path("profitability_year_long"),
            &header(&["year", "wkn", "days_held", "annual_yield"]),
            long,
        )
    }

    fn write_overview(&self, out: &RunOutput) -> Result<(), DepotError> {
        let cols = header(&[
            "date",
            "non_cash",
            "cash_like",
            "unrealized_gains_losses",
            "invest",
        ]);
        write_table(
            &self.path("overview_day"),
            &cols,
            overview_rows(out.overview.daily()),
        )?;
        write_table(
            &self.path("overview_month"),
            &cols,
            overview_rows(out.overview.per_period(Period::Month)),
        )?;
        write_table(
            &self.path("overview_year"),
            &cols,
            overview_rows(out.overview.per_period(Period::Year)),
        )
    }

    fn write_depot_statement(&self, out: &RunOutput) -> Result<(), DepotError> {
        let rows = out.depot_statement.iter().map(|r| {
            vec![r.date.to_string(), r.bank.clone(), num(r.cash), num(r.non_cash)]
        });
        write_table(
            &self.path("depot_statement_month"),
            &header(&["date", "bank", "cash", "non_cash"]),
            rows,
        )
    }

    fn write_allocation(&self, out: &RunOutput) -> Result<(), DepotError> {
        write_table(
            &self.path("values_type_month"),
            &header(&["date", "type", "value", "share"]),
            allocation_rows(&out.allocation_type),
        )?;
        write_table(
            &self.path("values_region_month"),
            &header(&["date", "region", "value", "share"]),
            allocation_rows(&out.allocation_region),
        )
    }

    fn write_bank_flows(&self, out: &RunOutput) -> Result<(), DepotError> {
        let tables: [(&str, fn(&BankFlow) -> f64); 3] = [
            ("fees", |f| f.fees),
            ("taxes", |f| f.taxes),
            ("interest_dividends", |f| f.interest_dividends),
        ];
        for (name, amount) in tables {
            write_table(
                &self.path(&format!("{name}_bank")),
                &header(&["date", "wkn", "bank", name]),
                bank_flow_rows(&out.bank_flows, amount),
            )?;
        }
        Ok(())
    }

    fn write_warnings(&self, out: &RunOutput) -> Result<(), DepotError> {
        let rows = out
            .diagnostics
            .warnings()
            .iter()
            .map(|w| vec![w.category().to_string(), w.to_string()]);
        write_table(
            &self.path("warnings"),
            &header(&["category", "message"]),
            rows,
        )
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, output: &RunOutput) -> Result<usize, DepotError> {
        fs::create_dir_all(&self.output_dir).map_err(|e| export_err(&self.output_dir, e))?;

        let s = self.selection;
        let mut written = 0;
        if s.shares_month_banks {
            self.write_shares_month_banks(output)?;
            written += 1;
        }
        if s.values_day {
            self.write_values_day(output)?;
            written += 1;
        }
        if s.values_month_banks {
            self.write_values_month_banks(output)?;
            written += 1;
        }
        if s.yield_day {
            self.write_yield_day(output)?;
            written += 1;
        }
        if s.profitability_year {
            self.write_profitability(output)?;
            written += 2;
        }
        if s.overview {
            self.write_overview(output)?;
            written += 3;
        }
        if s.depot_statement {
            self.write_depot_statement(output)?;
            written += 1;
        }
        if s.allocation {
            self.write_allocation(output)?;
            written += 2;
        }
        if s.bank_flows {
            self.write_bank_flows(output)?;
            written += 3;
        }
        if s.warnings {
            self.write_warnings(output)?;
            written += 1;
        }

        info!(files = written, dir = %self.output_dir.display(), "export complete");
        Ok(written)
    }
}
