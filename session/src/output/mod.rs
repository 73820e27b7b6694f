//! Report file output

pub mod csv;
pub mod json;
