//! Whole-table provisioning over raw string cells.
//!
//! Input columns are found by exact header match. Derived columns are
//! appended after every original column; original cells are never rewritten.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use super::columns::FloorQuarter;
use super::provision::{
    assumptions, provision_all, run_warnings, ProvisionSchedule, ProvisionedLoan, RunParameters,
};
use super::record::{normalize, parse_amount, LoanRecord};
use super::summary::{summarize, PortfolioSummary};
use crate::error::ProvisionError;
use crate::types::{with_metadata, ComputationOutput, Rate};
use crate::ProvisionResult;

/// A delimited-text table held as strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RecordTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Position of the first header exactly equal to `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Augmented table plus the typed rows behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionedTable {
    pub table: RecordTable,
    pub four_year_threshold: NaiveDate,
    pub unsecured_multiplier: Rate,
    pub loans: Vec<ProvisionedLoan>,
    pub summary: PortfolioSummary,
}

struct InputColumns {
    classification_date: usize,
    total_os: usize,
    collateral: usize,
    cashflow_cover: usize,
    held_ecl: usize,
}

impl InputColumns {
    fn resolve(table: &RecordTable, quarter: &FloorQuarter) -> ProvisionResult<Self> {
        let [date, os, collateral, cover, held] = quarter.required_columns();
        let find = |name: String| {
            table
                .column_index(&name)
                .ok_or(ProvisionError::MissingColumn { column: name })
        };
        Ok(Self {
            classification_date: find(date)?,
            total_os: find(os)?,
            collateral: find(collateral)?,
            cashflow_cover: find(cover)?,
            held_ecl: find(held)?,
        })
    }

    fn record(&self, row: &[String]) -> LoanRecord {
        let cell = |idx: usize| row.get(idx).map(String::as_str).unwrap_or("");
        let date = cell(self.classification_date).trim();
        LoanRecord {
            classification_date: (!date.is_empty()).then(|| date.to_string()),
            total_outstanding: parse_amount(cell(self.total_os)),
            collateral_after_haircut: parse_amount(cell(self.collateral)),
            unsecured_covered_by_cashflow: parse_amount(cell(self.cashflow_cover)),
            existing_ecl_held: parse_amount(cell(self.held_ecl)),
        }
    }
}

fn render_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

/// Render the appended cells for one provisioned row, in column order.
pub fn derived_cells(p: &ProvisionedLoan) -> Vec<String> {
    let d = &p.derived;
    vec![
        p.loan.classification_date.format("%Y-%m-%d").to_string(),
        render_decimal(d.years_since_npl),
        render_decimal(d.unsecured_whole),
        render_decimal(d.net_secured),
        render_decimal(d.net_unsecured),
        render_decimal(d.nusp_provision_a),
        render_decimal(d.nusp_provision_b),
        render_decimal(d.unsecured_provision),
        render_decimal(d.secured_provision),
        render_decimal(d.required_provision),
        render_decimal(d.floored_ecl),
        render_decimal(d.held_to_outstanding_ratio),
        render_decimal(d.final_ecl),
    ]
}

/// Provision every row of `table`.
///
/// A missing required column fails the whole run before any row is touched.
/// Rows shorter than the header are padded with empty cells; cells past the
/// last header are dropped.
pub fn provision_table(
    table: &RecordTable,
    params: &RunParameters,
    quarter: &FloorQuarter,
) -> ProvisionResult<ComputationOutput<ProvisionedTable>> {
    let start = Instant::now();

    let columns = InputColumns::resolve(table, quarter)?;
    debug!(
        columns = table.headers.len(),
        rows = table.rows.len(),
        floor_quarter = %quarter,
        "Input columns resolved"
    );

    let schedule = ProvisionSchedule::new(params)?;
    let warnings = run_warnings(params);

    let loans = provision_all(
        table
            .rows
            .iter()
            .map(|row| normalize(&columns.record(row))),
        &schedule,
    );

    let width = table.headers.len();
    let mut headers = table.headers.clone();
    headers.extend(quarter.derived_columns());

    let rows = table
        .rows
        .iter()
        .zip(&loans)
        .map(|(row, p)| {
            let mut out = row.clone();
            out.resize(width, String::new());
            out.extend(derived_cells(p));
            out
        })
        .collect();

    let summary = summarize(&loans);
    info!(
        loans = summary.loan_count,
        fallback_dates = summary.fallback_date_count,
        total_final_ecl = %summary.total_final_ecl,
        "Stage 3 provision table computed"
    );

    let rows_processed = loans.len();
    let output = ProvisionedTable {
        table: RecordTable::new(headers, rows),
        four_year_threshold: schedule.four_year_threshold,
        unsecured_multiplier: schedule.unsecured_multiplier,
        loans,
        summary,
    };

    let mut assumed = assumptions(&schedule);
    assumed["floor_quarter"] = serde_json::Value::String(quarter.to_string());

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "CRMS Stage 3 minimum provision with held-ECL floor",
        &assumed,
        warnings,
        rows_processed,
        elapsed,
        output,
    ))
}
