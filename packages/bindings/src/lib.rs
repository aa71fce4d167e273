use napi::Result as NapiResult;
use napi_derive::napi;
use serde::{Deserialize, Serialize};

use crms_provision_core::stage3::columns::FloorQuarter;
use crms_provision_core::stage3::provision::{self, RunParameters, Stage3ProvisionInput};
use crms_provision_core::stage3::summary::PortfolioSummary;
use crms_provision_core::stage3::table;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

/// Raw table plus run parameters, as sent from JS.
#[derive(Deserialize)]
struct TableRequest {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    crms_issue_date: String,
    run_date: String,
    #[serde(default)]
    floor_quarter: Option<String>,
}

#[derive(Serialize)]
struct TableResponse {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    summary: PortfolioSummary,
    warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Stage 3 provisioning
// ---------------------------------------------------------------------------

#[napi]
pub fn stage3_provisions(input_json: String) -> NapiResult<String> {
    let input: Stage3ProvisionInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = provision::calculate_stage3_provisions(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn stage3_provision_table(request_json: String) -> NapiResult<String> {
    let request: TableRequest = serde_json::from_str(&request_json).map_err(to_napi_error)?;
    let params =
        RunParameters::parse(&request.crms_issue_date, &request.run_date).map_err(to_napi_error)?;
    let quarter = match request.floor_quarter {
        Some(ref tag) => tag.parse::<FloorQuarter>().map_err(to_napi_error)?,
        None => FloorQuarter::default(),
    };

    let input = table::RecordTable::new(request.headers, request.rows);
    let output = table::provision_table(&input, &params, &quarter).map_err(to_napi_error)?;

    let response = TableResponse {
        headers: output.result.table.headers,
        rows: output.result.table.rows,
        summary: output.result.summary,
        warnings: output.warnings,
    };
    serde_json::to_string(&response).map_err(to_napi_error)
}
