//! JSON output
//!
//! Writes reports as pretty JSON and reads them back, so runs can be merged
//! or diffed later.

use anyhow::{Context, Result};
use callscope_shared::Report;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

/// Write `report` to `output_path` as JSON
pub fn generate_json(report: &Report, output_path: &Path) -> Result<()> {
    info!("Generating JSON output: {}", output_path.display());

    let file = File::create(output_path)
        .with_context(|| format!("Failed to create output file: {}", output_path.display()))?;

    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, report).context("Failed to serialize report to JSON")?;

    info!(
        "JSON output written to {} ({} calls)",
        output_path.display(),
        report.calls().len()
    );

    Ok(())
}

/// Read a report previously written by [`generate_json`]
pub fn load_json(path: &Path) -> Result<Report> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open report: {}", path.display()))?;
    let report = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse report: {}", path.display()))?;
    Ok(report)
}
