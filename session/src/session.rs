//! Profiling sessions
//!
//! A [`ProfileSession`] sits between the executor and the collectors. The
//! executor reports each call's begin and end; the session fans the events
//! out to every collector, keeps per-thread call stacks so nesting stays
//! LIFO, and at [`ProfileSession::finalize`] folds everything into a
//! [`Report`].
//!
//! The session is `Sync`: executors running operators on several threads
//! share one session by reference (or `Arc`). Each thread gets its own
//! call stack, so nesting on one thread never interferes with another.

use anyhow::Context;
use callscope_counters::CounterBackend;
use callscope_shared::{
    accumulate, CallId, CallRecord, DeviceHandle, MetricMap, MetricValue, ProfilingError,
    Report, Result, CALLS_METRIC, TRUNCATED_METRIC,
};
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use std::thread::{self, ThreadId};
use tracing::{debug, info, warn};

use crate::collector::{Collector, MetricCollector};
use crate::config::SessionConfig;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Running,
    Finalized,
}

/// A call that has begun but not ended
#[derive(Debug)]
struct OpenCall {
    id: CallId,
    name: String,
    device: DeviceHandle,
    depth: u32,
    /// Thread that opened the call
    thread: ThreadId,
    /// Whether each collector (by position) accepted `begin`
    began: Vec<bool>,
    /// Error markers from collectors that failed `begin`
    errors: MetricMap,
}

/// One profiling run
#[derive(Debug)]
pub struct ProfileSession {
    config: SessionConfig,
    phase: RwLock<SessionPhase>,
    collectors: OnceLock<Vec<Collector>>,
    next_call_id: AtomicU64,
    open: Mutex<HashMap<ThreadId, Vec<OpenCall>>>,
    completed: Mutex<Vec<CallRecord>>,
}

impl ProfileSession {
    /// Create an idle session. Collectors are supplied at [`start`](Self::start).
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            phase: RwLock::new(SessionPhase::Idle),
            collectors: OnceLock::new(),
            next_call_id: AtomicU64::new(1),
            open: Mutex::new(HashMap::new()),
            completed: Mutex::new(Vec::new()),
        }
    }

    /// Build the collectors described by `config` and start the session.
    pub fn from_config(
        config: SessionConfig,
        backend: Arc<dyn CounterBackend>,
    ) -> anyhow::Result<Self> {
        config.validate().context("Invalid session configuration")?;
        let collectors = config
            .build_collectors(backend)
            .context("Failed to build collectors")?;
        let session = Self::new(config);
        session.start(collectors)?;
        Ok(session)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register collectors and begin accepting call events.
    pub fn start(&self, collectors: Vec<Collector>) -> Result<()> {
        let mut phase = self.phase.write().unwrap_or_else(PoisonError::into_inner);
        match *phase {
            SessionPhase::Idle => {}
            SessionPhase::Running => return Err(ProfilingError::AlreadyStarted),
            SessionPhase::Finalized => return Err(ProfilingError::AlreadyFinalized),
        }

        let names: Vec<&str> = collectors.iter().map(|c| c.name()).collect();
        info!(
            "Starting profiling session `{}` with collectors: [{}]",
            self.config.name,
            names.join(", ")
        );

        self.collectors
            .set(collectors)
            .map_err(|_| ProfilingError::AlreadyStarted)?;
        *phase = SessionPhase::Running;
        Ok(())
    }

    /// Record the start of a call on the current thread.
    ///
    /// Collector failures do not fail the call: they are recorded as an
    /// `"<collector> error"` metric on the resulting call record.
    pub fn record_call_begin(&self, name: &str, device: &DeviceHandle) -> Result<CallId> {
        let phase = self.phase.read().unwrap_or_else(PoisonError::into_inner);
        ensure_running(*phase)?;

        let id = CallId::new(self.next_call_id.fetch_add(1, Ordering::Relaxed));
        let collectors = self.collectors();
        let mut began = Vec::with_capacity(collectors.len());
        let mut errors = MetricMap::new();

        for collector in collectors {
            match collector.begin(id, device) {
                Ok(()) => began.push(true),
                Err(e) => {
                    warn!("{} begin failed for `{}` {}: {}", collector.name(), name, id, e);
                    errors.insert(error_metric(collector), MetricValue::Text(e.to_string()));
                    began.push(false);
                }
            }
        }

        let depth = {
            let thread = thread::current().id();
            let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
            let stack = open.entry(thread).or_default();
            let depth = stack.len() as u32 + 1;
            stack.push(OpenCall {
                id,
                name: name.to_string(),
                device: device.clone(),
                depth,
                thread,
                began,
                errors,
            });
            depth
        };

        debug!("begin {} `{}` on {} (depth {})", id, name, device, depth);
        Ok(id)
    }

    /// Record the end of the innermost open call on the current thread.
    ///
    /// Fails with [`ProfilingError::UnmatchedCall`] if `call_id` is not that
    /// call; the open stack is left untouched in that case.
    pub fn record_call_end(&self, call_id: CallId) -> Result<()> {
        let phase = self.phase.read().unwrap_or_else(PoisonError::into_inner);
        ensure_running(*phase)?;

        let frame = {
            let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
            let thread_id = thread::current().id();
            let stack = open
                .get_mut(&thread_id)
                .ok_or_else(|| ProfilingError::unmatched(call_id, "no open call on this thread"))?;

            let top = stack.last().map(|call| (call.id, call.name.clone()));
            match top {
                Some((top_id, _)) if top_id == call_id => {}
                Some((top_id, top_name)) => {
                    return Err(ProfilingError::unmatched(
                        call_id,
                        format!("innermost open call on this thread is {} `{}`", top_id, top_name),
                    ));
                }
                None => {
                    return Err(ProfilingError::unmatched(call_id, "no open call on this thread"));
                }
            }

            let frame = stack
                .pop()
                .ok_or_else(|| ProfilingError::unmatched(call_id, "no open call on this thread"))?;
            if stack.is_empty() {
                open.remove(&thread_id);
            }
            frame
        };

        let record = self.close_call(frame, false);
        debug!("end {} `{}` on {}", call_id, record.name, record.device);
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }

    /// Begin a call that ends when the returned guard is finished or dropped.
    pub fn call(&self, name: &str, device: &DeviceHandle) -> Result<CallGuard<'_>> {
        let id = self.record_call_begin(name, device)?;
        Ok(CallGuard {
            session: self,
            id,
            finished: false,
            _thread: PhantomData,
        })
    }

    /// Number of calls currently open across all threads.
    pub fn open_calls(&self) -> usize {
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Stop the session and produce its report.
    ///
    /// Calls still open on any thread are closed innermost-first and marked
    /// `truncated`. Waits for in-flight begin/end events to finish.
    pub fn finalize(&self) -> Result<Report> {
        let mut phase = self.phase.write().unwrap_or_else(PoisonError::into_inner);
        match *phase {
            SessionPhase::Running => {}
            SessionPhase::Idle => return Err(ProfilingError::NotRunning),
            SessionPhase::Finalized => return Err(ProfilingError::AlreadyFinalized),
        }
        *phase = SessionPhase::Finalized;

        let mut leftovers: Vec<OpenCall> = self
            .open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .flat_map(|(_, stack)| stack)
            .collect();
        leftovers.sort_by(|a, b| b.id.cmp(&a.id));
        if !leftovers.is_empty() {
            warn!("Closing {} open call(s) as truncated", leftovers.len());
        }

        let mut calls =
            std::mem::take(&mut *self.completed.lock().unwrap_or_else(PoisonError::into_inner));
        for frame in leftovers {
            calls.push(self.close_call(frame, true));
        }

        let device_metrics = aggregate_devices(&calls);
        info!(
            "Profiling session `{}` finalized: {} calls on {} device(s)",
            self.config.name,
            calls.len(),
            device_metrics.len()
        );

        Ok(Report::new(calls, device_metrics))
    }

    fn collectors(&self) -> &[Collector] {
        self.collectors.get().map(Vec::as_slice).unwrap_or(&[])
    }

    fn close_call(&self, frame: OpenCall, truncated: bool) -> CallRecord {
        let mut metrics = frame.errors;
        let foreign = frame.thread != thread::current().id();

        for (collector, began) in self.collectors().iter().zip(frame.began) {
            if !began {
                continue;
            }
            if foreign && collector.thread_bound() {
                // values read here would belong to the finalizing thread
                let message = match collector.discard(frame.id) {
                    Ok(()) => "call was left open on another thread".to_string(),
                    Err(e) => e.to_string(),
                };
                warn!(
                    "{} skipped `{}` {}: {}",
                    collector.name(),
                    frame.name,
                    frame.id,
                    message
                );
                metrics.insert(error_metric(collector), MetricValue::Text(message));
                continue;
            }
            match collector.end(frame.id) {
                Ok(values) => {
                    for (name, value) in values {
                        if metrics.insert(name.clone(), value).is_some() {
                            debug!("{} overrode metric `{}` on {}", collector.name(), name, frame.id);
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "{} end failed for `{}` {}: {}",
                        collector.name(),
                        frame.name,
                        frame.id,
                        e
                    );
                    metrics.insert(error_metric(collector), MetricValue::Text(e.to_string()));
                }
            }
        }

        if truncated {
            metrics.insert(TRUNCATED_METRIC.to_string(), MetricValue::Text("true".to_string()));
        }

        CallRecord::new(frame.name, frame.device, frame.depth, metrics)
    }
}

/// RAII scope for one call
///
/// The call belongs to the thread that opened it, so the guard cannot be
/// moved to another thread:
///
/// ```compile_fail
/// use callscope_session::{ProfileSession, SessionConfig};
/// use callscope_shared::DeviceHandle;
///
/// let session = ProfileSession::new(SessionConfig::named("guard"));
/// session.start(vec![]).unwrap();
/// let guard = session.call("op", &DeviceHandle::cpu(0)).unwrap();
/// std::thread::scope(|s| {
///     s.spawn(move || drop(guard));
/// });
/// ```
#[derive(Debug)]
pub struct CallGuard<'a> {
    session: &'a ProfileSession,
    id: CallId,
    finished: bool,
    _thread: PhantomData<*const ()>,
}

impl CallGuard<'_> {
    pub fn id(&self) -> CallId {
        self.id
    }

    /// End the call, surfacing any error.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.session.record_call_end(self.id)
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.session.record_call_end(self.id) {
                warn!("Dropped call guard {} could not end its call: {}", self.id, e);
            }
        }
    }
}

fn ensure_running(phase: SessionPhase) -> Result<()> {
    match phase {
        SessionPhase::Running => Ok(()),
        SessionPhase::Idle => Err(ProfilingError::NotRunning),
        SessionPhase::Finalized => Err(ProfilingError::AlreadyFinalized),
    }
}

fn error_metric(collector: &Collector) -> String {
    format!("{} error", collector.name())
}

/// Fold every aggregatable call metric into per-device totals.
///
/// A metric whose variant changes between calls cannot be summed; the
/// offending sample is skipped and logged.
fn aggregate_devices(calls: &[CallRecord]) -> BTreeMap<DeviceHandle, MetricMap> {
    let mut devices: BTreeMap<DeviceHandle, MetricMap> = BTreeMap::new();

    for call in calls {
        let totals = devices.entry(call.device.clone()).or_default();
        if let Err(e) = accumulate(totals, CALLS_METRIC, &MetricValue::Count(1)) {
            warn!("Skipping call count on {}: {}", call.device, e);
        }
        for (name, value) in call.metrics.iter().filter(|(_, v)| v.is_aggregatable()) {
            if let Err(e) = accumulate(totals, name, value) {
                warn!("Skipping `{}` sample of `{}` on {}: {}", name, call.name, call.device, e);
            }
        }
    }

    devices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{HardwareCounterCollector, UserCollector, WallClockCollector};
    use callscope_shared::DURATION_METRIC;

    fn running_session() -> ProfileSession {
        let session = ProfileSession::new(SessionConfig::named("test"));
        session
            .start(vec![WallClockCollector::new().into()])
            .unwrap();
        session
    }

    #[test]
    fn test_state_machine() {
        let session = ProfileSession::new(SessionConfig::named("test"));
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(
            session.record_call_begin("op", &DeviceHandle::cpu(0)),
            Err(ProfilingError::NotRunning)
        );
        assert_eq!(session.finalize().unwrap_err(), ProfilingError::NotRunning);

        session.start(vec![]).unwrap();
        assert_eq!(session.phase(), SessionPhase::Running);
        assert_eq!(session.start(vec![]), Err(ProfilingError::AlreadyStarted));

        session.finalize().unwrap();
        assert_eq!(session.phase(), SessionPhase::Finalized);
        assert_eq!(session.finalize().unwrap_err(), ProfilingError::AlreadyFinalized);
        assert_eq!(session.start(vec![]), Err(ProfilingError::AlreadyFinalized));
        assert_eq!(
            session.record_call_begin("op", &DeviceHandle::cpu(0)),
            Err(ProfilingError::AlreadyFinalized)
        );
    }

    #[test]
    fn test_nested_calls_record_depth() {
        let session = running_session();
        let cpu = DeviceHandle::cpu(0);

        let op1 = session.record_call_begin("op1", &cpu).unwrap();
        let op2 = session.record_call_begin("op2", &cpu).unwrap();
        session.record_call_end(op2).unwrap();
        session.record_call_end(op1).unwrap();

        let report = session.finalize().unwrap();
        assert_eq!(report.calls().len(), 2);
        assert_eq!(report.calls()[0].name, "op2");
        assert_eq!(report.calls()[0].depth, 2);
        assert_eq!(report.calls()[1].name, "op1");
        assert_eq!(report.calls()[1].depth, 1);
        for call in report.calls() {
            assert!(call.duration_secs().unwrap() >= 0.0);
        }
        assert_eq!(report.device_metric(&cpu, CALLS_METRIC), Some(&MetricValue::Count(2)));
    }

    #[test]
    fn test_out_of_order_end_is_rejected() {
        let session = running_session();
        let cpu = DeviceHandle::cpu(0);
        let outer = session.record_call_begin("outer", &cpu).unwrap();
        let inner = session.record_call_begin("inner", &cpu).unwrap();

        assert!(matches!(
            session.record_call_end(outer),
            Err(ProfilingError::UnmatchedCall { .. })
        ));
        // the rejected close leaves the stack intact
        assert_eq!(session.open_calls(), 2);
        session.record_call_end(inner).unwrap();
        session.record_call_end(outer).unwrap();
        assert_eq!(session.open_calls(), 0);
    }

    #[test]
    fn test_end_without_begin() {
        let session = running_session();
        assert!(matches!(
            session.record_call_end(CallId::new(42)),
            Err(ProfilingError::UnmatchedCall { .. })
        ));
    }

    #[test]
    fn test_finalize_truncates_open_calls() {
        let session = running_session();
        let cpu = DeviceHandle::cpu(0);
        let done = session.record_call_begin("done", &cpu).unwrap();
        session.record_call_end(done).unwrap();
        session.record_call_begin("outer", &cpu).unwrap();
        session.record_call_begin("inner", &cpu).unwrap();

        let report = session.finalize().unwrap();
        let names: Vec<&str> = report.calls().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["done", "inner", "outer"]);
        assert!(!report.calls()[0].is_truncated());
        assert!(report.calls()[1].is_truncated());
        assert!(report.calls()[2].is_truncated());
        assert!(report.calls()[2].metric(DURATION_METRIC).is_some());
    }

    #[test]
    fn test_failing_collector_does_not_abort_run() {
        let session = ProfileSession::new(SessionConfig::named("test"));
        session
            .start(vec![
                WallClockCollector::new().into(),
                UserCollector::new(
                    "broken",
                    |_, _| anyhow::bail!("counter unavailable"),
                    |_| Ok(MetricMap::new()),
                )
                .into(),
            ])
            .unwrap();

        let cpu = DeviceHandle::cpu(0);
        let id = session.record_call_begin("conv", &cpu).unwrap();
        session.record_call_end(id).unwrap();
        let report = session.finalize().unwrap();

        let call = &report.calls()[0];
        assert!(call.duration_secs().is_some());
        assert_eq!(
            call.metric("broken error"),
            Some(&MetricValue::Text(
                "collector `broken` failed: counter unavailable".to_string()
            ))
        );
        // text markers stay out of device totals
        assert!(report.device_metric(&cpu, "broken error").is_none());
    }

    #[test]
    fn test_failing_end_is_recorded() {
        let session = ProfileSession::new(SessionConfig::named("test"));
        session
            .start(vec![UserCollector::new(
                "late",
                |_, _| Ok(()),
                |_| anyhow::bail!("read timed out"),
            )
            .into()])
            .unwrap();

        let id = session.record_call_begin("gemm", &DeviceHandle::gpu(0)).unwrap();
        session.record_call_end(id).unwrap();
        let report = session.finalize().unwrap();
        assert!(report.calls()[0].metric("late error").is_some());
    }

    #[test]
    fn test_call_guard_ends_on_drop() {
        let session = running_session();
        let cpu = DeviceHandle::cpu(0);
        {
            let _outer = session.call("outer", &cpu).unwrap();
            let inner = session.call("inner", &cpu).unwrap();
            inner.finish().unwrap();
        }
        assert_eq!(session.open_calls(), 0);

        let report = session.finalize().unwrap();
        assert_eq!(report.calls().len(), 2);
        assert!(report.calls().iter().all(|c| !c.is_truncated()));
    }

    #[test]
    fn test_device_totals_fold_durations() {
        let session = ProfileSession::new(SessionConfig::named("test"));
        session
            .start(vec![UserCollector::new(
                "fixed",
                |_, _| Ok(()),
                |_| {
                    let mut m = MetricMap::new();
                    m.insert(DURATION_METRIC.to_string(), MetricValue::Duration(0.25));
                    m.insert("label".to_string(), MetricValue::Text("x".to_string()));
                    Ok(m)
                },
            )
            .into()])
            .unwrap();

        let gpu = DeviceHandle::gpu(0);
        let cpu = DeviceHandle::cpu(0);
        for device in [&gpu, &gpu, &cpu] {
            let id = session.record_call_begin("op", device).unwrap();
            session.record_call_end(id).unwrap();
        }

        let report = session.finalize().unwrap();
        assert_eq!(
            report.device_metric(&gpu, DURATION_METRIC),
            Some(&MetricValue::Duration(0.5))
        );
        assert_eq!(
            report.device_metric(&cpu, DURATION_METRIC),
            Some(&MetricValue::Duration(0.25))
        );
        assert!(report.device_metric(&gpu, "label").is_none());
    }

    #[test]
    fn test_aggregate_skips_mismatched_samples() {
        let cpu = DeviceHandle::cpu(0);
        let mut a = MetricMap::new();
        a.insert("x".to_string(), MetricValue::Count(1));
        let mut b = MetricMap::new();
        b.insert("x".to_string(), MetricValue::Bytes(1));
        let calls = vec![
            CallRecord::new("a", cpu.clone(), 1, a),
            CallRecord::new("b", cpu.clone(), 1, b),
        ];

        let devices = aggregate_devices(&calls);
        assert_eq!(devices[&cpu]["x"], MetricValue::Count(1));
        assert_eq!(devices[&cpu][CALLS_METRIC], MetricValue::Count(2));
    }

    /// Counter that advances on every read and claims per-thread scope
    struct TickCounter(AtomicU64);

    impl CounterBackend for TickCounter {
        fn name(&self) -> &str {
            "tick"
        }

        fn available_counters(&self, _device: &DeviceHandle) -> Vec<String> {
            vec!["ticks".to_string()]
        }

        fn per_thread(&self) -> bool {
            true
        }

        fn read(&self, _device: &DeviceHandle, counters: &[String]) -> anyhow::Result<Vec<u64>> {
            let now = self.0.fetch_add(100, Ordering::Relaxed);
            Ok(counters.iter().map(|_| now).collect())
        }
    }

    #[test]
    fn test_thread_bound_counters_skip_calls_left_on_other_threads() {
        let cpu = DeviceHandle::cpu(0);
        let mut counters = HashMap::new();
        counters.insert(cpu.clone(), vec!["ticks".to_string()]);
        let hardware =
            HardwareCounterCollector::new(Arc::new(TickCounter(AtomicU64::new(0))), counters)
                .unwrap();

        let session = ProfileSession::new(SessionConfig::named("test"));
        session
            .start(vec![WallClockCollector::new().into(), hardware.into()])
            .unwrap();

        thread::scope(|s| {
            s.spawn(|| session.record_call_begin("worker_op", &cpu).unwrap())
                .join()
                .unwrap();
        });
        session.record_call_begin("main_op", &cpu).unwrap();

        let report = session.finalize().unwrap();
        let worker = report.calls().iter().find(|c| c.name == "worker_op").unwrap();
        assert!(worker.is_truncated());
        assert!(worker.metric("ticks").is_none());
        assert!(worker.metric("tick counters error").is_some());
        assert!(worker.metric(DURATION_METRIC).is_some());

        // calls left open on the finalizing thread are still measured
        let main = report.calls().iter().find(|c| c.name == "main_op").unwrap();
        assert!(main.is_truncated());
        assert!(main.metric("ticks").is_some());
        assert!(main.metric("tick counters error").is_none());
    }
}
