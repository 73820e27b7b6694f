//! Counters fed by the executor
//!
//! Some devices expose their counters only through vendor tooling the
//! executor already talks to (CUPTI, rocprof, ...). [`ManualCounters`] lets
//! the executor publish those values; collectors read them like any other
//! backend.

use anyhow::Result;
use callscope_shared::DeviceHandle;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use tracing::debug;

use crate::{CounterBackend, CounterError};

/// Executor-published counter values. Thread-safe.
#[derive(Debug, Default)]
pub struct ManualCounters {
    values: RwLock<HashMap<DeviceHandle, BTreeMap<String, u64>>>,
}

impl ManualCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a counter on `device`, starting at zero.
    pub fn define(&self, device: &DeviceHandle, counter: &str) -> Result<()> {
        let mut values = self.values.write().map_err(|_| CounterError::Poisoned)?;
        values
            .entry(device.clone())
            .or_default()
            .entry(counter.to_string())
            .or_insert(0);
        Ok(())
    }

    /// Add `delta` to a declared counter.
    pub fn add(&self, device: &DeviceHandle, counter: &str, delta: u64) -> Result<()> {
        let mut values = self.values.write().map_err(|_| CounterError::Poisoned)?;
        let slot = values
            .get_mut(device)
            .and_then(|counters| counters.get_mut(counter))
            .ok_or_else(|| CounterError::UnknownCounter {
                counter: counter.to_string(),
                device: device.to_string(),
            })?;
        *slot = slot.saturating_add(delta);
        debug!("{} {} += {} -> {}", device, counter, delta, slot);
        Ok(())
    }
}

impl CounterBackend for ManualCounters {
    fn name(&self) -> &str {
        "manual"
    }

    fn available_counters(&self, device: &DeviceHandle) -> Vec<String> {
        self.values
            .read()
            .map(|values| {
                values
                    .get(device)
                    .map(|counters| counters.keys().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn read(&self, device: &DeviceHandle, counters: &[String]) -> Result<Vec<u64>> {
        let values = self.values.read().map_err(|_| CounterError::Poisoned)?;
        let device_values = values
            .get(device)
            .ok_or_else(|| CounterError::DeviceUnavailable {
                backend: self.name().to_string(),
                device: device.to_string(),
            })?;

        let mut out = Vec::with_capacity(counters.len());
        for counter in counters {
            let value = device_values
                .get(counter)
                .copied()
                .ok_or_else(|| CounterError::UnknownCounter {
                    counter: counter.clone(),
                    device: device.to_string(),
                })?;
            out.push(value);
        }
        Ok(out)
    }
}
