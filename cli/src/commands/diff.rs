//! Diff command implementation

use anyhow::Result;
use callscope_session::output::json::load_json;
use callscope_shared::types::diff::{diff_reports, ReportDiff};
use clap::Args;
use std::path::PathBuf;

use crate::output;

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Baseline report (JSON)
    pub baseline: PathBuf,

    /// Comparison report (JSON)
    pub comparison: PathBuf,

    /// Number of calls to show
    #[arg(short = 'n', long, default_value = "20")]
    pub top: usize,
}

pub fn run(args: DiffArgs) -> Result<()> {
    let baseline = load_json(&args.baseline)?;
    let comparison = load_json(&args.comparison)?;

    let diff = diff_reports(&baseline, &comparison);
    if diff.calls.is_empty() {
        println!("No calls in either report.");
        return Ok(());
    }

    print_diff(&diff, args.top);
    Ok(())
}

fn print_diff(diff: &ReportDiff, top: usize) {
    println!("{}", output::heading("=== Call Diff ==="));
    println!(
        "  Baseline: {} calls, {:.1}us | Comparison: {} calls, {:.1}us",
        diff.baseline_calls,
        diff.baseline_duration_secs * 1e6,
        diff.comparison_calls,
        diff.comparison_duration_secs * 1e6
    );
    println!(
        "\n  {:>8} {:>8} {:>12} {:>12} {:>12} {:>8}  {:<8} CALL",
        "B.COUNT", "C.COUNT", "B.TIME(us)", "C.TIME(us)", "DELTA(us)", "%", "DEVICE"
    );

    for c in diff.calls.iter().take(top) {
        let delta_us = c.delta_secs * 1e6;
        let delta = output::delta(delta_us, format!("{:>+12.1}", delta_us));
        println!(
            "  {:>8} {:>8} {:>12.1} {:>12.1} {} {:>+7.1}%  {:<8} {}",
            c.baseline_count,
            c.comparison_count,
            c.baseline_secs * 1e6,
            c.comparison_secs * 1e6,
            delta,
            c.delta_pct,
            c.device.to_string(),
            c.name
        );
    }

    if diff.calls.len() > top {
        println!("  ... {} more", diff.calls.len() - top);
    }
}
