pub mod counters;
pub mod csv;
pub mod diff;
pub mod merge;
pub mod table;
