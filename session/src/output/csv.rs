//! CSV output

use anyhow::{Context, Result};
use callscope_shared::Report;
use std::path::Path;
use tracing::info;

/// Write the report's calls to `output_path` as CSV
pub fn generate_csv(report: &Report, output_path: &Path) -> Result<()> {
    info!("Generating CSV output: {}", output_path.display());

    let csv = report.csv().context("Failed to render report as CSV")?;
    std::fs::write(output_path, csv)
        .with_context(|| format!("Failed to write output file: {}", output_path.display()))?;

    info!("CSV output written to {}", output_path.display());
    Ok(())
}
