pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Render a run envelope in the format chosen on the command line.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}
