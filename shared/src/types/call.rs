//! Per-call records

use serde::{Deserialize, Serialize};
use std::fmt;

use super::device::DeviceHandle;
use super::metric::{MetricMap, MetricValue};

/// Session-unique identifier of an open call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallId(u64);

impl CallId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One completed (or truncated) call and everything measured for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Operator or function name
    pub name: String,

    /// Device the call executed on
    pub device: DeviceHandle,

    /// Nesting depth, 1 for a top-level call
    pub depth: u32,

    /// Metrics from every collector, by name
    pub metrics: MetricMap,
}

impl CallRecord {
    pub fn new(name: impl Into<String>, device: DeviceHandle, depth: u32, metrics: MetricMap) -> Self {
        Self {
            name: name.into(),
            device,
            depth,
            metrics,
        }
    }

    pub fn metric(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }

    /// Wall-clock duration in seconds, if a timer measured this call.
    pub fn duration_secs(&self) -> Option<f64> {
        self.metrics.get(DURATION_METRIC).and_then(MetricValue::as_seconds)
    }

    /// Whether the session closed this call at finalize time.
    pub fn is_truncated(&self) -> bool {
        self.metrics.contains_key(TRUNCATED_METRIC)
    }
}

/// Metric emitted by wall-clock timers
pub const DURATION_METRIC: &str = "Duration";

/// Marker attached to calls still open when the session was finalized
pub const TRUNCATED_METRIC: &str = "truncated";

/// Per-device number of calls, added at finalize
pub const CALLS_METRIC: &str = "Calls";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accessors() {
        let mut metrics = MetricMap::new();
        metrics.insert(DURATION_METRIC.to_string(), MetricValue::Duration(0.5));
        let record = CallRecord::new("fused_add", DeviceHandle::cpu(0), 1, metrics);

        assert_eq!(record.duration_secs(), Some(0.5));
        assert!(!record.is_truncated());
        assert!(record.metric("cycles").is_none());
    }

    #[test]
    fn test_truncated_marker() {
        let mut metrics = MetricMap::new();
        metrics.insert(TRUNCATED_METRIC.to_string(), MetricValue::Text("true".to_string()));
        let record = CallRecord::new("conv2d", DeviceHandle::gpu(0), 2, metrics);
        assert!(record.is_truncated());
        assert_eq!(record.duration_secs(), None);
    }
}
