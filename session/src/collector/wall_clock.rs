//! Wall-clock timer

use callscope_shared::{CallId, DeviceHandle, MetricMap, MetricValue, Result, DURATION_METRIC};
use std::time::Instant;

use super::{MetricCollector, OpenCalls};

/// Measures elapsed monotonic time per call
#[derive(Debug)]
pub struct WallClockCollector {
    open: OpenCalls<Instant>,
}

impl WallClockCollector {
    pub fn new() -> Self {
        Self {
            open: OpenCalls::new(),
        }
    }
}

impl Default for WallClockCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricCollector for WallClockCollector {
    fn name(&self) -> &str {
        "wall clock"
    }

    fn begin(&self, call_id: CallId, _device: &DeviceHandle) -> Result<()> {
        self.open.open(self.name(), call_id, Instant::now())
    }

    fn end(&self, call_id: CallId) -> Result<MetricMap> {
        let started = self.open.close(call_id)?;
        let mut metrics = MetricMap::new();
        metrics.insert(
            DURATION_METRIC.to_string(),
            MetricValue::from_duration(started.elapsed()),
        );
        Ok(metrics)
    }
}
