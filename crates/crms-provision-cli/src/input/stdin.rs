use serde_json::Value;
use std::io::{self, Read};

use crms_provision_core::stage3::table::RecordTable;

use super::csv_table;

/// Read all of stdin when data is being piped.
/// Returns None if stdin is a TTY (interactive) or empty.
fn read_piped() -> Result<Option<String>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;

    if buffer.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(buffer))
}

/// Attempt to read JSON from stdin if data is being piped.
pub fn read_stdin() -> Result<Option<Value>, Box<dyn std::error::Error>> {
    match read_piped()? {
        Some(buffer) => Ok(Some(serde_json::from_str(buffer.trim())?)),
        None => Ok(None),
    }
}

/// Attempt to read a delimited-text table from stdin if data is being piped.
pub fn read_stdin_csv(delimiter: u8) -> Result<Option<RecordTable>, Box<dyn std::error::Error>> {
    match read_piped()? {
        Some(buffer) => Ok(Some(csv_table::read_table(buffer.as_bytes(), delimiter)?)),
        None => Ok(None),
    }
}
