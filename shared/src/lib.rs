//! Shared types and utilities for Callscope
//!
//! This crate contains the data model used across the session, counter
//! backends and CLI: typed metric values, device handles, call records,
//! finalized reports and the error taxonomy.

pub mod error;
pub mod report;
pub mod types;

// Re-export commonly used types
pub use error::{ProfilingError, Result};
pub use report::Report;
pub use types::{call::*, device::*, metric::*};
