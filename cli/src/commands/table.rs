//! Table command implementation

use anyhow::Result;
use callscope_session::output::json::load_json;
use clap::Args;
use std::path::PathBuf;

use crate::output;

#[derive(Args, Debug)]
pub struct TableArgs {
    /// Report file (JSON)
    pub report: PathBuf,

    /// One row per call instead of one row per (operator, device)
    #[arg(long)]
    pub no_aggregate: bool,
}

pub fn run(args: TableArgs) -> Result<()> {
    let report = load_json(&args.report)?;

    if report.is_empty() {
        output::warning("Report contains no calls");
        return Ok(());
    }

    println!("{}", output::heading(&format!("=== {} ===", args.report.display())));
    print!("{}", report.table(!args.no_aggregate));

    let truncated = report.calls().iter().filter(|c| c.is_truncated()).count();
    if truncated > 0 {
        output::warning(&format!("{} call(s) were truncated at finalize", truncated));
    }

    Ok(())
}
