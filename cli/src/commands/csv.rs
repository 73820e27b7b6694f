//! CSV command implementation

use anyhow::{Context, Result};
use callscope_session::output::{csv::generate_csv, json::load_json};
use clap::Args;
use std::path::PathBuf;

use crate::output;

#[derive(Args, Debug)]
pub struct CsvArgs {
    /// Report file (JSON)
    pub report: PathBuf,

    /// Output file (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: CsvArgs) -> Result<()> {
    let report = load_json(&args.report)?;

    match args.output {
        Some(path) => {
            generate_csv(&report, &path)?;
            output::success(&format!(
                "Wrote {} calls to {}",
                report.calls().len(),
                path.display()
            ));
        }
        None => {
            let csv = report.csv().context("Failed to render report as CSV")?;
            print!("{}", csv);
        }
    }

    Ok(())
}
