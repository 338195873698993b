use std::io::Write;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

/// Writes display rows as CSV with a header taken from the row's field names.
pub fn write_csv<T: Serialize, W: Write>(rows: &[T], writer: W) -> anyhow::Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(rows.len())
}

pub fn write_csv_file<T: Serialize>(rows: &[T], path: &Path) -> anyhow::Result<usize> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_csv(rows, file).with_context(|| format!("failed to write CSV to {}", path.display()))
}
