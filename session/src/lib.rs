//! Profiling session library
//!
//! This library provides the runtime side of Callscope: the metric
//! collectors, the session that brackets every executed call with them, and
//! file output for the resulting reports.
//!
//! ```no_run
//! use callscope_session::{ProfileSession, SessionConfig, WallClockCollector};
//! use callscope_shared::DeviceHandle;
//!
//! # fn main() -> anyhow::Result<()> {
//! let session = ProfileSession::new(SessionConfig::named("demo"));
//! session.start(vec![WallClockCollector::new().into()])?;
//!
//! let cpu = DeviceHandle::cpu(0);
//! let call = session.record_call_begin("fused_conv2d", &cpu)?;
//! // ... run the operator ...
//! session.record_call_end(call)?;
//!
//! let report = session.finalize()?;
//! println!("{}", report.csv()?);
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod output;
pub mod session;

pub use collector::{
    Collector, HardwareCounterCollector, MetricCollector, UserCollector, WallClockCollector,
};
pub use config::SessionConfig;
pub use session::{CallGuard, ProfileSession, SessionPhase};
