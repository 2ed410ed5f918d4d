//! CSV export of filtered records
//!
//! The caller maps each record to an ordered column map. The header row is
//! taken from the first record's keys; later records are written in that
//! column order, with missing keys left empty.

use serde_json::{Map, Value};
use std::io::Write;

use crate::error::QueryError;

/// Write `records` as CSV, returning the number of data rows written
pub fn write_csv<'r, W, T, I, F>(writer: W, records: I, columns: F) -> Result<usize, QueryError>
where
    W: Write,
    T: 'r,
    I: IntoIterator<Item = &'r T>,
    F: Fn(&T) -> Map<String, Value>,
{
    let mut csv = csv::Writer::from_writer(writer);
    let mut header: Option<Vec<String>> = None;
    let mut rows = 0;

    for record in records {
        let row = columns(record);
        let keys = header.get_or_insert_with(|| row.keys().cloned().collect());
        if rows == 0 {
            csv.write_record(keys.iter())?;
        }
        csv.write_record(keys.iter().map(|key| cell(row.get(key))))?;
        rows += 1;
    }

    csv.flush().map_err(csv::Error::from)?;
    tracing::debug!(rows, "Exported CSV");
    Ok(rows)
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
