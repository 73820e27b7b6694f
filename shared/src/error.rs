//! Error taxonomy for the profiling core

use thiserror::Error;

use crate::types::call::CallId;

/// Errors produced by sessions, collectors and reports.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfilingError {
    /// `end` without a matching `begin`, or a close that breaks LIFO nesting
    #[error("unmatched call end for call {call_id}: {reason}")]
    UnmatchedCall { call_id: CallId, reason: String },

    #[error("profiling session already started")]
    AlreadyStarted,

    #[error("profiling session already finalized")]
    AlreadyFinalized,

    #[error("profiling session is not running")]
    NotRunning,

    /// Raised while constructing a hardware counter collector
    #[error("counter `{counter}` is not available on device {device}")]
    UnsupportedCounter { counter: String, device: String },

    #[error("cannot combine metric `{name}`: {left} and {right} are incompatible")]
    IncompatibleMetric {
        name: String,
        left: &'static str,
        right: &'static str,
    },

    /// Failure inside a collector or its counter backend
    #[error("collector `{collector}` failed: {message}")]
    Collector { collector: String, message: String },

    #[error("export failed: {0}")]
    Export(String),
}

impl ProfilingError {
    pub fn unmatched(call_id: CallId, reason: impl Into<String>) -> Self {
        Self::UnmatchedCall {
            call_id,
            reason: reason.into(),
        }
    }

    pub fn collector(collector: impl Into<String>, message: impl ToString) -> Self {
        Self::Collector {
            collector: collector.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T, E = ProfilingError> = std::result::Result<T, E>;
