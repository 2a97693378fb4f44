use std::io::Write;
use std::path::Path;

use super::error::OutputError;
use super::handler::DecodedChannel;

/// Write decoded channels as CSV: one column per channel, headed by its label.
///
/// Columns shorter than the longest are padded with empty fields.
pub fn write_csv<W: Write>(
    wtr: &mut csv::Writer<W>,
    channels: &[DecodedChannel],
) -> Result<(), OutputError> {
    wtr.write_record(channels.iter().map(|c| c.label.as_str()))?;

    let n_rows = channels.iter().map(|c| c.values.len()).max().unwrap_or(0);
    for row in 0..n_rows {
        wtr.write_record(channels.iter().map(|c| match c.values.get(row) {
            Some(value) => value.to_string(),
            None => String::new(),
        }))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write decoded channels to a CSV file at `path`, creating parent directories as needed
pub fn write_csv_file(path: &Path, channels: &[DecodedChannel]) -> Result<(), OutputError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    write_csv(&mut wtr, channels)?;
    log::info!(
        "Wrote {} channels to {}",
        channels.len(),
        path.to_string_lossy()
    );
    Ok(())
}
