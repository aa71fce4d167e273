use clap::Args;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use tracing::info;

use crms_provision_core::stage3::provision::{
    self, RunParameters, Stage3ProvisionInput, Stage3ProvisionOutput,
};
use crms_provision_core::stage3::record::LoanRecord;
use crms_provision_core::stage3::table::{self, ProvisionedTable, RecordTable};
use crms_provision_core::ComputationOutput;

use crate::config::RunArgs;
use crate::input;
use crate::output;

/// Arguments for whole-file provisioning
#[derive(Args)]
pub struct ProvisionsArgs {
    /// Path to CSV loan file (reads piped stdin when omitted)
    #[arg(long)]
    pub input: Option<String>,

    /// Write the augmented CSV to this path and print only the summary
    #[arg(long)]
    pub out: Option<String>,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments for a single loan or a typed JSON batch
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct LoanArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// NPL classification date
    #[arg(long)]
    pub classification_date: Option<String>,

    /// Total outstanding (TOTAL OS)
    #[arg(long, alias = "os")]
    pub total_os: Option<Decimal>,

    /// Collateral after haircut
    #[arg(long)]
    pub collateral: Option<Decimal>,

    /// Unsecured portion covered by ECF/DCF
    #[arg(long)]
    pub cashflow_cover: Option<Decimal>,

    /// Existing ECL held at the floor quarter
    #[arg(long)]
    pub existing_ecl: Option<Decimal>,

    #[command(flatten)]
    pub run: RunArgs,
}

pub fn run_provisions(args: ProvisionsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let settings = args.run.resolve()?;

    let loans: RecordTable = if let Some(ref path) = args.input {
        input::file::read_csv_table(path, settings.delimiter)?
    } else if let Some(data) = input::stdin::read_stdin_csv(settings.delimiter)? {
        data
    } else {
        return Err("--input <loans.csv> or piped CSV on stdin required".into());
    };

    let params = RunParameters::parse(&settings.crms_issue_date, &settings.run_date)?;
    let out = table::provision_table(&loans, &params, &settings.floor_quarter)?;

    if let Some(ref path) = args.out {
        output::csv_out::write_table(path, &out.result.table, settings.delimiter)?;
        info!(path = %path, rows = out.result.table.rows.len(), "Augmented table written");
        return Ok(summary_envelope(&out, path)?);
    }

    Ok(rows_envelope(&out)?)
}

pub fn run_loan(args: LoanArgs) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(ref path) = args.input {
        let batch: Stage3ProvisionInput = input::file::read_json(path)?;
        return batch_envelope(&batch);
    }
    if let Some(data) = input::stdin::read_stdin()? {
        let batch: Stage3ProvisionInput = serde_json::from_value(data)?;
        return batch_envelope(&batch);
    }

    let settings = args.run.resolve()?;
    let single = Stage3ProvisionInput {
        crms_issue_date: settings.crms_issue_date,
        run_date: settings.run_date,
        loans: vec![LoanRecord {
            classification_date: args.classification_date,
            total_outstanding: Some(
                args.total_os
                    .ok_or("--total-os is required (or provide --input)")?,
            ),
            collateral_after_haircut: args.collateral,
            unsecured_covered_by_cashflow: args.cashflow_cover,
            existing_ecl_held: args.existing_ecl,
        }],
    };

    let out = provision::calculate_stage3_provisions(&single)?;
    single_loan_envelope(out)
}

fn batch_envelope(batch: &Stage3ProvisionInput) -> Result<Value, Box<dyn std::error::Error>> {
    let out = provision::calculate_stage3_provisions(batch)?;
    Ok(serde_json::to_value(out)?)
}

/// Flatten the one-loan envelope so table/csv show field/value pairs.
fn single_loan_envelope(
    out: ComputationOutput<Stage3ProvisionOutput>,
) -> Result<Value, Box<dyn std::error::Error>> {
    let loan = out
        .result
        .loans
        .first()
        .ok_or("no loan in single-loan computation")?;

    let mut result = Map::new();
    result.insert(
        "classification_date".into(),
        json!(loan.loan.classification_date),
    );
    result.insert(
        "classification_date_substituted".into(),
        json!(loan.loan.classification_date_substituted),
    );
    result.insert(
        "four_year_threshold".into(),
        json!(out.result.four_year_threshold),
    );
    result.insert(
        "unsecured_multiplier".into(),
        json!(out.result.unsecured_multiplier),
    );
    if let Value::Object(derived) = serde_json::to_value(&loan.derived)? {
        result.extend(derived);
    }

    Ok(json!({
        "result": result,
        "methodology": out.methodology,
        "assumptions": out.assumptions,
        "warnings": out.warnings,
        "metadata": out.metadata,
    }))
}

/// One JSON object per augmented row, keys in column order.
pub fn table_rows(table: &RecordTable) -> Vec<Value> {
    table
        .rows
        .iter()
        .map(|row| {
            let obj: Map<String, Value> = table
                .headers
                .iter()
                .zip(row)
                .map(|(h, cell)| (h.clone(), Value::String(cell.clone())))
                .collect();
            Value::Object(obj)
        })
        .collect()
}

fn rows_envelope(
    out: &ComputationOutput<ProvisionedTable>,
) -> Result<Value, serde_json::Error> {
    Ok(json!({
        "results": table_rows(&out.result.table),
        "summary": serde_json::to_value(&out.result.summary)?,
        "methodology": out.methodology,
        "assumptions": out.assumptions,
        "warnings": out.warnings,
        "metadata": out.metadata,
    }))
}

fn summary_envelope(
    out: &ComputationOutput<ProvisionedTable>,
    path: &str,
) -> Result<Value, serde_json::Error> {
    let mut result = match serde_json::to_value(&out.result.summary)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    result.insert("output_path".into(), json!(path));
    result.insert(
        "rows_written".into(),
        json!(out.result.table.rows.len()),
    );

    Ok(json!({
        "result": result,
        "methodology": out.methodology,
        "assumptions": out.assumptions,
        "warnings": out.warnings,
        "metadata": out.metadata,
    }))
}
