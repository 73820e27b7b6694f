//! Session configuration
//!
//! Sessions can be configured in code, from the environment, or from a TOML
//! file:
//!
//! ```toml
//! name = "resnet50-batch1"
//! wall_clock = true
//!
//! [counters]
//! "cpu:0" = ["minor-faults", "voluntary-switches"]
//! ```

use anyhow::{Context, Result};
use callscope_counters::CounterBackend;
use callscope_shared::DeviceHandle;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::collector::{Collector, HardwareCounterCollector, WallClockCollector};

/// Profiling session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session name, shown in logs
    pub name: String,

    /// Time every call with a wall-clock collector
    pub wall_clock: bool,

    /// Hardware counters to sample, keyed by device (`"cpu:0"`)
    pub counters: BTreeMap<String, Vec<String>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: std::env::var("CALLSCOPE_SESSION_NAME").unwrap_or_else(|_| "default".to_string()),
            wall_clock: parse_flag(std::env::var("CALLSCOPE_WALL_CLOCK").ok().as_deref(), true),
            counters: BTreeMap::new(),
        }
    }
}

impl SessionConfig {
    /// Wall-clock-only configuration with the given name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            wall_clock: true,
            counters: BTreeMap::new(),
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: SessionConfig = toml::from_str(s).context("Failed to parse session config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Counter lists keyed by parsed device handle.
    pub fn counter_devices(&self) -> Result<HashMap<DeviceHandle, Vec<String>>> {
        let mut out = HashMap::with_capacity(self.counters.len());
        for (device, names) in &self.counters {
            let handle: DeviceHandle = device
                .parse()
                .map_err(|e: String| anyhow::anyhow!("Invalid device `{}`: {}", device, e))?;
            if out.insert(handle.clone(), names.clone()).is_some() {
                anyhow::bail!("Device {} configured more than once", handle);
            }
        }
        Ok(out)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Session name must not be empty");
        }

        for (device, names) in self.counter_devices()? {
            if names.is_empty() {
                anyhow::bail!("No counters listed for device {}", device);
            }
            let mut seen = HashSet::new();
            for name in &names {
                if !seen.insert(name.as_str()) {
                    anyhow::bail!("Counter `{}` listed twice for device {}", name, device);
                }
            }
        }

        if !self.wall_clock && self.counters.is_empty() {
            anyhow::bail!("At least one collector must be enabled");
        }

        Ok(())
    }

    /// Instantiate the configured collectors.
    ///
    /// Unsupported counters surface as
    /// [`ProfilingError::UnsupportedCounter`](callscope_shared::ProfilingError::UnsupportedCounter)
    /// inside the returned error.
    pub fn build_collectors(&self, backend: Arc<dyn CounterBackend>) -> Result<Vec<Collector>> {
        let mut collectors = Vec::new();
        if self.wall_clock {
            collectors.push(WallClockCollector::new().into());
        }
        let counters = self.counter_devices()?;
        if !counters.is_empty() {
            collectors.push(HardwareCounterCollector::new(backend, counters)?.into());
        }
        Ok(collectors)
    }
}

fn parse_flag(value: Option<&str>, default: bool) -> bool {
    match value.map(|v| v.trim().to_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}
