//! Hardware performance counter collector
//!
//! Configured up front with the counters to sample on each device. Every
//! requested name is checked against the backend when the collector is
//! built; an unknown counter is an error, never a silent skip.

use callscope_counters::CounterBackend;
use callscope_shared::{
    CallId, DeviceHandle, MetricMap, MetricValue, ProfilingError, Result,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::{MetricCollector, OpenCalls};

/// Device and counter values read at `begin`
type StartValues = Option<(DeviceHandle, Vec<u64>)>;

/// Samples named counters before and after each call and reports deltas
pub struct HardwareCounterCollector {
    name: String,
    backend: Arc<dyn CounterBackend>,
    counters: HashMap<DeviceHandle, Vec<String>>,
    open: OpenCalls<StartValues>,
}

impl HardwareCounterCollector {
    /// Build a collector sampling `counters[device]` on each device.
    ///
    /// Fails with [`ProfilingError::UnsupportedCounter`] if the backend does
    /// not expose one of the names on its device.
    pub fn new(
        backend: Arc<dyn CounterBackend>,
        counters: HashMap<DeviceHandle, Vec<String>>,
    ) -> Result<Self> {
        for (device, names) in &counters {
            for counter in names {
                if !backend.supports(device, counter) {
                    return Err(ProfilingError::UnsupportedCounter {
                        counter: counter.clone(),
                        device: device.to_string(),
                    });
                }
            }
            debug!(
                "{} counters on {}: {}",
                backend.name(),
                device,
                names.join(", ")
            );
        }

        Ok(Self {
            name: format!("{} counters", backend.name()),
            backend,
            counters,
            open: OpenCalls::new(),
        })
    }

    /// Counters sampled on `device`, empty when the device is not configured.
    pub fn counters_for(&self, device: &DeviceHandle) -> &[String] {
        self.counters.get(device).map(Vec::as_slice).unwrap_or(&[])
    }

    fn read(&self, device: &DeviceHandle, names: &[String]) -> Result<Vec<u64>> {
        let values = self
            .backend
            .read(device, names)
            .map_err(|e| ProfilingError::collector(&self.name, e))?;
        if values.len() != names.len() {
            return Err(ProfilingError::collector(
                &self.name,
                format!(
                    "backend returned {} values for {} counters",
                    values.len(),
                    names.len()
                ),
            ));
        }
        Ok(values)
    }
}

impl fmt::Debug for HardwareCounterCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareCounterCollector")
            .field("name", &self.name)
            .field("counters", &self.counters)
            .finish()
    }
}

impl MetricCollector for HardwareCounterCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&self, call_id: CallId, device: &DeviceHandle) -> Result<()> {
        let start = match self.counters.get(device) {
            Some(names) => Some((device.clone(), self.read(device, names)?)),
            None => None,
        };
        self.open.open(&self.name, call_id, start)
    }

    fn end(&self, call_id: CallId) -> Result<MetricMap> {
        let mut metrics = MetricMap::new();
        let Some((device, start)) = self.open.close(call_id)? else {
            return Ok(metrics);
        };

        let names = self.counters_for(&device);
        let now = self.read(&device, names)?;
        for ((name, before), after) in names.iter().zip(start).zip(now) {
            metrics.insert(name.clone(), MetricValue::Count(after.saturating_sub(before)));
        }
        Ok(metrics)
    }

    fn thread_bound(&self) -> bool {
        self.backend.per_thread()
    }

    fn discard(&self, call_id: CallId) -> Result<()> {
        self.open.close(call_id).map(|_| ())
    }
}
