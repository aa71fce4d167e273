use std::io::{self, Write};

use serde_json::Value;

/// Write a run envelope to stdout as indented JSON.
pub fn print_json(value: &Value) {
    if let Err(e) = write_json(&mut io::stdout().lock(), value) {
        eprintln!("failed to write JSON output: {e}");
    }
}

/// Indented JSON followed by a newline.
pub fn write_json<W: Write>(out: &mut W, value: &Value) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    out.write_all(b"\n")
}
