//! CLI for Callscope
//!
//! Works on reports saved as JSON by a profiling session:
//! - csv: export a report's calls as CSV
//! - table: print a per-call or per-operator summary
//! - merge: combine several runs into one report
//! - diff: compare a baseline run against a comparison run
//! - counters: list the OS counters available on this machine

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "callscope")]
#[command(about = "Callscope - per-call profiling reports", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a report as CSV
    Csv(commands::csv::CsvArgs),

    /// Print a report as a table
    Table(commands::table::TableArgs),

    /// Merge several reports into one
    Merge(commands::merge::MergeArgs),

    /// Compare two reports
    Diff(commands::diff::DiffArgs),

    /// List hardware counters readable by the OS backend
    Counters(commands::counters::CountersArgs),
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli.command) {
        output::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Csv(args) => commands::csv::run(args),
        Commands::Table(args) => commands::table::run(args),
        Commands::Merge(args) => commands::merge::run(args),
        Commands::Diff(args) => commands::diff::run(args),
        Commands::Counters(args) => commands::counters::run(args),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
