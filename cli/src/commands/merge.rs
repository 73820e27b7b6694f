//! Merge command implementation

use anyhow::{Context, Result};
use callscope_session::output::json::{generate_json, load_json};
use callscope_shared::Report;
use clap::Args;
use std::path::PathBuf;
use tracing::debug;

use crate::output;

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Report files (JSON), merged in the order given
    #[arg(required = true, num_args = 2..)]
    pub reports: Vec<PathBuf>,

    /// Output file for the merged report
    #[arg(short, long)]
    pub output: PathBuf,
}

pub fn run(args: MergeArgs) -> Result<()> {
    let merged = merge_files(&args.reports)?;
    generate_json(&merged, &args.output)?;

    output::success(&format!(
        "Merged {} reports ({} calls) into {}",
        args.reports.len(),
        merged.calls().len(),
        args.output.display()
    ));
    Ok(())
}

/// Load and merge reports left to right.
fn merge_files(paths: &[PathBuf]) -> Result<Report> {
    let mut merged = Report::default();
    for path in paths {
        let report = load_json(path)?;
        debug!("Merging {} ({} calls)", path.display(), report.calls().len());
        merged = merged
            .merge(&report)
            .with_context(|| format!("Cannot merge {}", path.display()))?;
    }
    Ok(merged)
}
