//! Typed metric values
//!
//! Every collector reports its measurements as [`MetricValue`]s. The variant
//! is fixed when the value is created; aggregation only ever combines two
//! values of the same variant.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ProfilingError, Result};

/// Metric name → value, ordered by name so exports are deterministic.
pub type MetricMap = BTreeMap<String, MetricValue>;

/// A single typed metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    /// Elapsed time in seconds
    Duration(f64),

    /// Event count (calls, counter deltas, ...)
    Count(u64),

    /// Share of some total, 0-100
    Percent(f64),

    /// Size in bytes
    Bytes(u64),

    /// Unitless ratio
    Ratio(f64),

    /// Free-form text (error markers, labels)
    Text(String),
}

impl MetricValue {
    /// Build a duration metric from a `std::time::Duration`.
    pub fn from_duration(d: std::time::Duration) -> Self {
        MetricValue::Duration(d.as_secs_f64())
    }

    /// Name of the variant, used in error messages and table headers.
    pub fn variant_name(&self) -> &'static str {
        match self {
            MetricValue::Duration(_) => "duration",
            MetricValue::Count(_) => "count",
            MetricValue::Percent(_) => "percent",
            MetricValue::Bytes(_) => "bytes",
            MetricValue::Ratio(_) => "ratio",
            MetricValue::Text(_) => "text",
        }
    }

    /// Whether [`MetricValue::combine`] is defined for this variant.
    pub fn is_aggregatable(&self) -> bool {
        matches!(
            self,
            MetricValue::Duration(_)
                | MetricValue::Count(_)
                | MetricValue::Bytes(_)
                | MetricValue::Ratio(_)
        )
    }

    /// Seconds held by a `Duration`, `None` for every other variant.
    pub fn as_seconds(&self) -> Option<f64> {
        match self {
            MetricValue::Duration(secs) => Some(*secs),
            _ => None,
        }
    }

    /// Sum two values of the same aggregatable variant.
    ///
    /// Integer variants saturate instead of wrapping. Ratios are summed
    /// plainly; collectors that want a weighted ratio report the parts as
    /// counts instead.
    pub fn combine(&self, other: &MetricValue, name: &str) -> Result<MetricValue> {
        match (self, other) {
            (MetricValue::Duration(a), MetricValue::Duration(b)) => {
                Ok(MetricValue::Duration(a + b))
            }
            (MetricValue::Count(a), MetricValue::Count(b)) => {
                Ok(MetricValue::Count(a.saturating_add(*b)))
            }
            (MetricValue::Bytes(a), MetricValue::Bytes(b)) => {
                Ok(MetricValue::Bytes(a.saturating_add(*b)))
            }
            (MetricValue::Ratio(a), MetricValue::Ratio(b)) => Ok(MetricValue::Ratio(a + b)),
            (left, right) => Err(ProfilingError::IncompatibleMetric {
                name: name.to_string(),
                left: left.variant_name(),
                right: right.variant_name(),
            }),
        }
    }

    /// Canonical, locale-independent rendering used by CSV export.
    pub fn to_display_string(&self) -> String {
        match self {
            MetricValue::Duration(secs) => format!("{:.9}", secs),
            MetricValue::Count(n) => n.to_string(),
            MetricValue::Percent(p) => format!("{:.2}", p),
            MetricValue::Bytes(n) => n.to_string(),
            MetricValue::Ratio(r) => format!("{:.6}", r),
            MetricValue::Text(s) => s.clone(),
        }
    }

    /// Human-oriented rendering used by the table view.
    pub fn humanize(&self) -> String {
        match self {
            MetricValue::Duration(secs) => format!("{:.2}us", secs * 1_000_000.0),
            MetricValue::Percent(p) => format!("{:.2}%", p),
            MetricValue::Bytes(n) => humanize_bytes(*n),
            other => other.to_display_string(),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

/// Fold `value` into `map[name]`, inserting it when the name is new.
pub fn accumulate(map: &mut MetricMap, name: &str, value: &MetricValue) -> Result<()> {
    match map.get_mut(name) {
        Some(existing) => {
            *existing = existing.combine(value, name)?;
        }
        None => {
            map.insert(name.to_string(), value.clone());
        }
    }
    Ok(())
}

fn humanize_bytes(n: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if n < 1024 {
        return format!("{}B", n);
    }
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2}{}", value, UNITS[unit])
}
