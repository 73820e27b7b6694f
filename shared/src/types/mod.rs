//! Core data types

pub mod call;
pub mod device;
pub mod diff;
pub mod metric;
