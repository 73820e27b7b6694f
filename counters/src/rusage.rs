//! OS resource-usage counters via `getrusage(2)`
//!
//! On Linux the counters are per thread (`RUSAGE_THREAD`), which matches the
//! session's per-thread call nesting. Other Unix systems fall back to
//! process-wide usage. Only CPU devices expose these counters.

use anyhow::Result;
use callscope_shared::DeviceHandle;

use crate::{CounterBackend, CounterError};

/// Counter names exposed by [`RusageBackend`]
pub const RUSAGE_COUNTERS: &[&str] = &[
    "user-time-us",
    "system-time-us",
    "minor-faults",
    "major-faults",
    "voluntary-switches",
    "involuntary-switches",
    "block-in",
    "block-out",
];

/// Resource-usage backend for CPU devices
#[derive(Debug, Default, Clone, Copy)]
pub struct RusageBackend;

impl RusageBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CounterBackend for RusageBackend {
    fn name(&self) -> &str {
        "rusage"
    }

    fn available_counters(&self, device: &DeviceHandle) -> Vec<String> {
        if device.is_cpu() && cfg!(unix) {
            RUSAGE_COUNTERS.iter().map(|s| s.to_string()).collect()
        } else {
            Vec::new()
        }
    }

    fn per_thread(&self) -> bool {
        cfg!(target_os = "linux")
    }

    fn read(&self, device: &DeviceHandle, counters: &[String]) -> Result<Vec<u64>> {
        if !device.is_cpu() {
            return Err(CounterError::DeviceUnavailable {
                backend: self.name().to_string(),
                device: device.to_string(),
            }
            .into());
        }

        let usage = sys::current_usage()?;
        counters
            .iter()
            .map(|counter| -> Result<u64> {
                let value = usage.get(counter).ok_or_else(|| CounterError::UnknownCounter {
                    counter: counter.clone(),
                    device: device.to_string(),
                })?;
                Ok(value)
            })
            .collect()
    }
}

/// Snapshot of the fields we expose, already widened to u64
#[derive(Debug, Default, Clone, Copy)]
struct Usage {
    user_us: u64,
    system_us: u64,
    minor_faults: u64,
    major_faults: u64,
    voluntary_switches: u64,
    involuntary_switches: u64,
    block_in: u64,
    block_out: u64,
}

impl Usage {
    fn get(&self, counter: &str) -> Option<u64> {
        let value = match counter {
            "user-time-us" => self.user_us,
            "system-time-us" => self.system_us,
            "minor-faults" => self.minor_faults,
            "major-faults" => self.major_faults,
            "voluntary-switches" => self.voluntary_switches,
            "involuntary-switches" => self.involuntary_switches,
            "block-in" => self.block_in,
            "block-out" => self.block_out,
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(unix)]
mod sys {
    use super::Usage;
    use crate::CounterError;
    use std::mem::MaybeUninit;

    #[cfg(target_os = "linux")]
    const WHO: libc::c_int = libc::RUSAGE_THREAD;

    #[cfg(not(target_os = "linux"))]
    const WHO: libc::c_int = libc::RUSAGE_SELF;

    fn widen(v: libc::c_long) -> u64 {
        v.max(0) as u64
    }

    fn micros(tv: libc::timeval) -> u64 {
        widen(tv.tv_sec as libc::c_long) * 1_000_000 + widen(tv.tv_usec as libc::c_long)
    }

    pub(super) fn current_usage() -> Result<Usage, CounterError> {
        let mut raw = MaybeUninit::<libc::rusage>::zeroed();
        // SAFETY: getrusage only writes into the provided struct
        let rc = unsafe { libc::getrusage(WHO, raw.as_mut_ptr()) };
        if rc != 0 {
            return Err(CounterError::Os(std::io::Error::last_os_error()));
        }
        // SAFETY: zero-initialized and filled by a successful getrusage
        let raw = unsafe { raw.assume_init() };

        Ok(Usage {
            user_us: micros(raw.ru_utime),
            system_us: micros(raw.ru_stime),
            minor_faults: widen(raw.ru_minflt),
            major_faults: widen(raw.ru_majflt),
            voluntary_switches: widen(raw.ru_nvcsw),
            involuntary_switches: widen(raw.ru_nivcsw),
            block_in: widen(raw.ru_inblock),
            block_out: widen(raw.ru_oublock),
        })
    }
}

#[cfg(not(unix))]
mod sys {
    use super::Usage;
    use crate::CounterError;

    pub(super) fn current_usage() -> Result<Usage, CounterError> {
        Err(CounterError::Os(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "getrusage is only available on Unix",
        )))
    }
}
