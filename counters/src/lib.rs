//! Hardware counter backends
//!
//! A [`CounterBackend`] knows which named counters a device exposes and can
//! read their current values. Collectors take two reads around a call and
//! report the deltas.

pub mod manual;
pub mod rusage;

use anyhow::Result;
use callscope_shared::DeviceHandle;
use thiserror::Error;

pub use manual::ManualCounters;
pub use rusage::RusageBackend;

/// Source of named, monotonically increasing counters
pub trait CounterBackend: Send + Sync {
    /// Short backend name, used in logs and error messages
    fn name(&self) -> &str;

    /// Counter names readable on `device`
    fn available_counters(&self, device: &DeviceHandle) -> Vec<String>;

    /// Check a single counter without reading it
    fn supports(&self, device: &DeviceHandle, counter: &str) -> bool {
        self.available_counters(device).iter().any(|c| c == counter)
    }

    /// Whether values are scoped to the reading thread. Deltas across two
    /// threads are meaningless for such backends.
    fn per_thread(&self) -> bool {
        false
    }

    /// Read the current value of each counter, in the order given
    fn read(&self, device: &DeviceHandle, counters: &[String]) -> Result<Vec<u64>>;
}

/// Errors raised by the bundled backends
#[derive(Debug, Error)]
pub enum CounterError {
    #[error("counter `{counter}` is not available on {device}")]
    UnknownCounter { counter: String, device: String },

    #[error("backend `{backend}` has no counters for device {device}")]
    DeviceUnavailable { backend: String, device: String },

    #[error("counter state lock poisoned")]
    Poisoned,

    #[error("OS counter read failed: {0}")]
    Os(#[from] std::io::Error),
}
