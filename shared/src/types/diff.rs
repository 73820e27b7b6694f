//! Differential profiling between two reports
//!
//! Compares a baseline run against a comparison run call-by-call, keyed by
//! (call name, device), and computes duration and call-count deltas.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::device::DeviceHandle;
use crate::report::Report;

/// Diff of two reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDiff {
    pub baseline_calls: u64,
    pub comparison_calls: u64,
    pub baseline_duration_secs: f64,
    pub comparison_duration_secs: f64,
    /// Per-call diffs sorted by |delta_secs| descending.
    pub calls: Vec<CallDiff>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallDiff {
    pub name: String,
    pub device: DeviceHandle,
    pub baseline_count: u64,
    pub comparison_count: u64,
    pub baseline_secs: f64,
    pub comparison_secs: f64,
    /// comparison - baseline
    pub delta_secs: f64,
    /// delta / baseline * 100 (0.0 if baseline is 0)
    pub delta_pct: f64,
}

#[derive(Default)]
struct Totals {
    count: u64,
    secs: f64,
}

fn totals_by_call(report: &Report) -> BTreeMap<(String, DeviceHandle), Totals> {
    let mut totals: BTreeMap<(String, DeviceHandle), Totals> = BTreeMap::new();
    for call in report.calls() {
        let entry = totals
            .entry((call.name.clone(), call.device.clone()))
            .or_default();
        entry.count += 1;
        entry.secs += call.duration_secs().unwrap_or(0.0);
    }
    totals
}

/// Compare two reports per (name, device).
pub fn diff_reports(baseline: &Report, comparison: &Report) -> ReportDiff {
    let base = totals_by_call(baseline);
    let comp = totals_by_call(comparison);

    let all_keys: BTreeSet<&(String, DeviceHandle)> = base.keys().chain(comp.keys()).collect();

    let mut calls: Vec<CallDiff> = all_keys
        .into_iter()
        .map(|key| {
            let b = base.get(key);
            let c = comp.get(key);
            let b_secs = b.map_or(0.0, |t| t.secs);
            let c_secs = c.map_or(0.0, |t| t.secs);
            let delta = c_secs - b_secs;
            let delta_pct = if b_secs > 0.0 {
                delta / b_secs * 100.0
            } else {
                0.0
            };
            CallDiff {
                name: key.0.clone(),
                device: key.1.clone(),
                baseline_count: b.map_or(0, |t| t.count),
                comparison_count: c.map_or(0, |t| t.count),
                baseline_secs: b_secs,
                comparison_secs: c_secs,
                delta_secs: delta,
                delta_pct,
            }
        })
        .collect();

    calls.sort_by(|a, b| b.delta_secs.abs().total_cmp(&a.delta_secs.abs()));

    ReportDiff {
        baseline_calls: baseline.calls().len() as u64,
        comparison_calls: comparison.calls().len() as u64,
        baseline_duration_secs: baseline.total_duration(None),
        comparison_duration_secs: comparison.total_duration(None),
        calls,
    }
}
