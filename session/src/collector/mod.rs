//! Metric collectors
//!
//! A collector is bracketed around every call: `begin` when the executor
//! starts the call, `end` when it finishes. State is kept per call id, so
//! one collector serves nested calls and calls on other threads at once.

pub mod hardware;
pub mod user;
pub mod wall_clock;

use callscope_shared::{CallId, DeviceHandle, MetricMap, ProfilingError, Result};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

pub use hardware::HardwareCounterCollector;
pub use user::UserCollector;
pub use wall_clock::WallClockCollector;

/// Per-call metric collection
pub trait MetricCollector: Send + Sync {
    /// Label used for error markers and logs
    fn name(&self) -> &str;

    /// Start measuring `call_id` on `device`
    fn begin(&self, call_id: CallId, device: &DeviceHandle) -> Result<()>;

    /// Stop measuring `call_id` and return what was collected
    fn end(&self, call_id: CallId) -> Result<MetricMap>;

    /// Whether `end` has to run on the thread that called `begin`
    fn thread_bound(&self) -> bool {
        false
    }

    /// Release `call_id` without reporting anything for it
    fn discard(&self, call_id: CallId) -> Result<()> {
        self.end(call_id).map(|_| ())
    }
}

/// The collectors a session can run
#[derive(Debug)]
pub enum Collector {
    WallClock(WallClockCollector),
    HardwareCounter(HardwareCounterCollector),
    User(UserCollector),
}

impl MetricCollector for Collector {
    fn name(&self) -> &str {
        match self {
            Collector::WallClock(c) => c.name(),
            Collector::HardwareCounter(c) => c.name(),
            Collector::User(c) => c.name(),
        }
    }

    fn begin(&self, call_id: CallId, device: &DeviceHandle) -> Result<()> {
        match self {
            Collector::WallClock(c) => c.begin(call_id, device),
            Collector::HardwareCounter(c) => c.begin(call_id, device),
            Collector::User(c) => c.begin(call_id, device),
        }
    }

    fn end(&self, call_id: CallId) -> Result<MetricMap> {
        match self {
            Collector::WallClock(c) => c.end(call_id),
            Collector::HardwareCounter(c) => c.end(call_id),
            Collector::User(c) => c.end(call_id),
        }
    }

    fn thread_bound(&self) -> bool {
        match self {
            Collector::WallClock(c) => c.thread_bound(),
            Collector::HardwareCounter(c) => c.thread_bound(),
            Collector::User(c) => c.thread_bound(),
        }
    }

    fn discard(&self, call_id: CallId) -> Result<()> {
        match self {
            Collector::WallClock(c) => c.discard(call_id),
            Collector::HardwareCounter(c) => c.discard(call_id),
            Collector::User(c) => c.discard(call_id),
        }
    }
}

impl From<WallClockCollector> for Collector {
    fn from(c: WallClockCollector) -> Self {
        Collector::WallClock(c)
    }
}

impl From<HardwareCounterCollector> for Collector {
    fn from(c: HardwareCounterCollector) -> Self {
        Collector::HardwareCounter(c)
    }
}

impl From<UserCollector> for Collector {
    fn from(c: UserCollector) -> Self {
        Collector::User(c)
    }
}

/// Calls a collector has seen `begin` for but not yet `end`
#[derive(Debug)]
pub(crate) struct OpenCalls<T> {
    calls: Mutex<HashMap<CallId, T>>,
}

impl<T> OpenCalls<T> {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn open(&self, collector: &str, call_id: CallId, state: T) -> Result<()> {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        if calls.contains_key(&call_id) {
            return Err(ProfilingError::collector(
                collector,
                format!("call {} is already open", call_id),
            ));
        }
        calls.insert(call_id, state);
        Ok(())
    }

    pub(crate) fn close(&self, call_id: CallId) -> Result<T> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&call_id)
            .ok_or_else(|| ProfilingError::unmatched(call_id, "no matching begin"))
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
