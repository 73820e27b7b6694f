//! Counters command implementation

use anyhow::{Context, Result};
use callscope_counters::{CounterBackend, RusageBackend};
use callscope_shared::DeviceHandle;
use clap::Args;

use crate::output;

#[derive(Args, Debug)]
pub struct CountersArgs {
    /// Device to inspect (`cpu:0`, `gpu:1`, ...)
    #[arg(short, long, default_value = "cpu:0")]
    pub device: String,
}

pub fn run(args: CountersArgs) -> Result<()> {
    let device: DeviceHandle = args
        .device
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))
        .with_context(|| format!("Invalid device `{}`", args.device))?;

    let backend = RusageBackend::new();
    let counters = backend.available_counters(&device);
    if counters.is_empty() {
        output::warning(&format!(
            "Backend `{}` exposes no counters on {}",
            backend.name(),
            device
        ));
        return Ok(());
    }

    let values = backend
        .read(&device, &counters)
        .with_context(|| format!("Failed to read counters on {}", device))?;

    println!(
        "{}",
        output::heading(&format!("=== {} counters on {} ===", backend.name(), device))
    );
    println!("  {:<24} {:>16}", "COUNTER", "CURRENT");
    for (name, value) in counters.iter().zip(values) {
        println!("  {:<24} {:>16}", name, value);
    }

    Ok(())
}
