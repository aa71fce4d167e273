use std::io::Read;

use crms_provision_core::stage3::table::RecordTable;

/// Parse delimited text into a string table.
///
/// Rows may be ragged; the engine pads or truncates them to the header.
pub fn read_table<R: Read>(
    reader: R,
    delimiter: u8,
) -> Result<RecordTable, Box<dyn std::error::Error>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            // Spreadsheet exports often lead with a UTF-8 BOM
            if i == 0 {
                h.trim_start_matches('\u{feff}').to_string()
            } else {
                h.to_string()
            }
        })
        .collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(RecordTable::new(headers, rows))
}
