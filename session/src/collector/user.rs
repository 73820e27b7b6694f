//! User-defined collectors
//!
//! Wraps a pair of callbacks so domain-specific metrics (accuracy, cache
//! hit rates, allocator stats, ...) can ride along with the built-in
//! collectors. The wrapper enforces begin/end matching, so callbacks only
//! ever see well-formed sequences.

use callscope_shared::{CallId, DeviceHandle, MetricMap, ProfilingError, Result};
use std::fmt;
use std::sync::Arc;

use super::{MetricCollector, OpenCalls};

pub type BeginFn = Box<dyn Fn(CallId, &DeviceHandle) -> anyhow::Result<()> + Send + Sync>;
pub type EndFn = Box<dyn Fn(CallId) -> anyhow::Result<MetricMap> + Send + Sync>;

/// Collector backed by user callbacks
pub struct UserCollector {
    name: String,
    on_begin: BeginFn,
    on_end: EndFn,
    open: OpenCalls<()>,
}

impl UserCollector {
    pub fn new<B, E>(name: impl Into<String>, on_begin: B, on_end: E) -> Self
    where
        B: Fn(CallId, &DeviceHandle) -> anyhow::Result<()> + Send + Sync + 'static,
        E: Fn(CallId) -> anyhow::Result<MetricMap> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            on_begin: Box::new(on_begin),
            on_end: Box::new(on_end),
            open: OpenCalls::new(),
        }
    }

    /// Adapt any [`MetricCollector`] implementation, e.g. one from a plugin
    /// crate, into the session's collector set.
    pub fn from_collector<C>(collector: C) -> Self
    where
        C: MetricCollector + 'static,
    {
        let name = collector.name().to_string();
        let shared = Arc::new(collector);
        let for_end = Arc::clone(&shared);
        Self::new(
            name,
            move |call_id, device| shared.begin(call_id, device).map_err(anyhow::Error::from),
            move |call_id| for_end.end(call_id).map_err(anyhow::Error::from),
        )
    }
}

impl fmt::Debug for UserCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCollector")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl MetricCollector for UserCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&self, call_id: CallId, device: &DeviceHandle) -> Result<()> {
        (self.on_begin)(call_id, device).map_err(|e| ProfilingError::collector(&self.name, e))?;
        self.open.open(&self.name, call_id, ())
    }

    fn end(&self, call_id: CallId) -> Result<MetricMap> {
        self.open.close(call_id)?;
        (self.on_end)(call_id).map_err(|e| ProfilingError::collector(&self.name, e))
    }
}
