//! Finalized profiling reports
//!
//! A [`Report`] is what a profiling session hands back to the executor: the
//! calls in completion order plus per-device totals. Reports are immutable;
//! combining two runs produces a new report via [`Report::merge`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{ProfilingError, Result};
use crate::types::call::{CallRecord, CALLS_METRIC, DURATION_METRIC};
use crate::types::device::DeviceHandle;
use crate::types::metric::{accumulate, MetricMap, MetricValue};

/// Aggregate of one or more profiling runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    calls: Vec<CallRecord>,
    device_metrics: BTreeMap<DeviceHandle, MetricMap>,
}

impl Report {
    pub fn new(calls: Vec<CallRecord>, device_metrics: BTreeMap<DeviceHandle, MetricMap>) -> Self {
        Self {
            calls,
            device_metrics,
        }
    }

    /// Calls in completion order.
    pub fn calls(&self) -> &[CallRecord] {
        &self.calls
    }

    pub fn device_metrics(&self) -> &BTreeMap<DeviceHandle, MetricMap> {
        &self.device_metrics
    }

    pub fn device_metric(&self, device: &DeviceHandle, name: &str) -> Option<&MetricValue> {
        self.device_metrics.get(device).and_then(|m| m.get(name))
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Sorted union of every metric name recorded on any call.
    pub fn metric_names(&self) -> BTreeSet<&str> {
        self.calls
            .iter()
            .flat_map(|call| call.metrics.keys().map(String::as_str))
            .collect()
    }

    /// Total wall-clock time of top-level calls, optionally for one device.
    ///
    /// Only depth-1 calls count so nested calls are not double-counted.
    pub fn total_duration(&self, device: Option<&DeviceHandle>) -> f64 {
        self.calls
            .iter()
            .filter(|call| call.depth <= 1)
            .filter(|call| device.map_or(true, |d| &call.device == d))
            .filter_map(CallRecord::duration_secs)
            .sum()
    }

    /// Render the calls as CSV.
    ///
    /// Header is `Name,Device,Depth` followed by the sorted union of metric
    /// names (`metric:Depth` for a metric that shares a fixed column's name);
    /// rows follow completion order and missing metrics are empty.
    pub fn csv(&self) -> Result<String> {
        let names = self.metric_names();
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header: Vec<String> = CSV_FIXED_COLUMNS.iter().map(|s| s.to_string()).collect();
        header.extend(names.iter().map(|name| csv_column(name)));
        writer
            .write_record(&header)
            .map_err(|e| ProfilingError::Export(e.to_string()))?;

        for call in &self.calls {
            let mut row = vec![
                call.name.clone(),
                call.device.to_string(),
                call.depth.to_string(),
            ];
            row.extend(names.iter().map(|name| {
                call.metrics
                    .get(*name)
                    .map(MetricValue::to_display_string)
                    .unwrap_or_default()
            }));
            writer
                .write_record(&row)
                .map_err(|e| ProfilingError::Export(e.to_string()))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| ProfilingError::Export(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| ProfilingError::Export(e.to_string()))
    }

    /// Concatenate calls (self first) and fold device totals together.
    ///
    /// Fails when the same metric on the same device has different variants
    /// in the two reports.
    pub fn merge(&self, other: &Report) -> Result<Report> {
        let mut calls = Vec::with_capacity(self.calls.len() + other.calls.len());
        calls.extend(self.calls.iter().cloned());
        calls.extend(other.calls.iter().cloned());

        let mut device_metrics = self.device_metrics.clone();
        for (device, metrics) in &other.device_metrics {
            let target = device_metrics.entry(device.clone()).or_default();
            for (name, value) in metrics {
                accumulate(target, name, value)?;
            }
        }

        Ok(Report {
            calls,
            device_metrics,
        })
    }

    /// Pretty JSON, lossless.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ProfilingError::Export(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Report> {
        serde_json::from_str(json).map_err(|e| ProfilingError::Export(e.to_string()))
    }

    /// Human-readable table.
    ///
    /// With `aggregate`, calls sharing a name and device are collapsed into
    /// one row with a `Count` column and summed metrics, sorted by duration.
    /// Without it, every call gets a row in completion order, indented by
    /// depth. A per-device summary follows the rows.
    pub fn table(&self, aggregate: bool) -> String {
        let (rows, skipped) = if aggregate {
            self.aggregated_rows()
        } else {
            let rows: Vec<TableRow> = self
                .calls
                .iter()
                .map(|call| TableRow {
                    name: format!("{}{}", "  ".repeat(call.depth.saturating_sub(1) as usize), call.name),
                    device: call.device.to_string(),
                    count: 1,
                    metrics: call.metrics.clone(),
                })
                .collect();
            (rows, 0)
        };

        let total = self.total_duration(None);
        let extra: Vec<&str> = self
            .metric_names()
            .into_iter()
            .filter(|name| *name != DURATION_METRIC)
            .collect();

        let mut header: Vec<String> = vec!["Name".to_string(), "Device".to_string()];
        if aggregate {
            header.push("Count".to_string());
        }
        header.push("Duration (us)".to_string());
        header.push("Percent".to_string());
        header.extend(extra.iter().map(|s| s.to_string()));

        let mut cells: Vec<Vec<String>> = Vec::with_capacity(rows.len());
        for row in &rows {
            let secs = row.metrics.get(DURATION_METRIC).and_then(MetricValue::as_seconds);
            let mut line = vec![row.name.clone(), row.device.clone()];
            if aggregate {
                line.push(row.count.to_string());
            }
            line.push(
                secs.map(|s| format!("{:.2}", s * 1_000_000.0))
                    .unwrap_or_default(),
            );
            line.push(match secs {
                Some(s) if total > 0.0 => MetricValue::Percent(s / total * 100.0).humanize(),
                _ => String::new(),
            });
            for name in &extra {
                line.push(
                    row.metrics
                        .get(*name)
                        .map(MetricValue::humanize)
                        .unwrap_or_default(),
                );
            }
            cells.push(line);
        }

        let mut widths: Vec<usize> = header.iter().map(String::len).collect();
        for line in &cells {
            for (i, cell) in line.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        let mut out = String::new();
        out.push_str(&format_line(&header, &widths));
        for line in &cells {
            out.push_str(&format_line(line, &widths));
        }

        if skipped > 0 {
            out.push_str(&format!(
                "({} sample(s) skipped: metric type changed between calls)\n",
                skipped
            ));
        }

        if !self.device_metrics.is_empty() {
            out.push('\n');
            out.push_str("Device summary:\n");
            for (device, metrics) in &self.device_metrics {
                let parts: Vec<String> = metrics
                    .iter()
                    .map(|(name, value)| format!("{}={}", name, value.humanize()))
                    .collect();
                out.push_str(&format!("  {}  {}\n", device, parts.join("  ")));
            }
        }

        out
    }

    /// Rows grouped by (name, device), plus the number of samples that could
    /// not be summed into their row.
    fn aggregated_rows(&self) -> (Vec<TableRow>, usize) {
        let mut skipped = 0;
        let mut index: HashMap<(&str, &DeviceHandle), usize> = HashMap::new();
        let mut rows: Vec<TableRow> = Vec::new();

        for call in &self.calls {
            let slot = *index.entry((call.name.as_str(), &call.device)).or_insert_with(|| {
                rows.push(TableRow {
                    name: call.name.clone(),
                    device: call.device.to_string(),
                    count: 0,
                    metrics: MetricMap::new(),
                });
                rows.len() - 1
            });
            let row = &mut rows[slot];
            row.count += 1;
            for (name, value) in call.metrics.iter().filter(|(_, v)| v.is_aggregatable()) {
                if accumulate(&mut row.metrics, name, value).is_err() {
                    skipped += 1;
                }
            }
        }

        rows.sort_by(|a, b| {
            let da = a.metrics.get(DURATION_METRIC).and_then(MetricValue::as_seconds).unwrap_or(0.0);
            let db = b.metrics.get(DURATION_METRIC).and_then(MetricValue::as_seconds).unwrap_or(0.0);
            db.total_cmp(&da)
        });
        (rows, skipped)
    }

    /// Number of calls recorded for `device`, as folded at finalize time.
    pub fn call_count(&self, device: &DeviceHandle) -> u64 {
        match self.device_metric(device, CALLS_METRIC) {
            Some(MetricValue::Count(n)) => *n,
            _ => self.calls.iter().filter(|c| &c.device == device).count() as u64,
        }
    }
}

/// Leading CSV columns; metrics sharing one of these names get a prefix.
const CSV_FIXED_COLUMNS: [&str; 3] = ["Name", "Device", "Depth"];

fn csv_column(metric: &str) -> String {
    if CSV_FIXED_COLUMNS.contains(&metric) {
        format!("metric:{}", metric)
    } else {
        metric.to_string()
    }
}

struct TableRow {
    name: String,
    device: String,
    count: u64,
    metrics: MetricMap,
}

fn format_line(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::new();
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            line.push_str("  ");
        }
        if i < 2 {
            line.push_str(&format!("{:<width$}", cell, width = widths[i]));
        } else {
            line.push_str(&format!("{:>width$}", cell, width = widths[i]));
        }
    }
    line.truncate(line.trim_end().len());
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, device: DeviceHandle, depth: u32, metrics: &[(&str, MetricValue)]) -> CallRecord {
        CallRecord::new(
            name,
            device,
            depth,
            metrics
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn sample_report() -> Report {
        let calls = vec![
            call(
                "inner",
                DeviceHandle::cpu(0),
                2,
                &[("Duration", MetricValue::Duration(0.25)), ("cycles", MetricValue::Count(100))],
            ),
            call("outer", DeviceHandle::cpu(0), 1, &[("Duration", MetricValue::Duration(0.5))]),
        ];
        let mut device_metrics = BTreeMap::new();
        device_metrics.insert(
            DeviceHandle::cpu(0),
            [
                ("Duration".to_string(), MetricValue::Duration(0.75)),
                ("cycles".to_string(), MetricValue::Count(100)),
            ]
            .into_iter()
            .collect(),
        );
        Report::new(calls, device_metrics)
    }

    #[test]
    fn test_csv_header_and_rows() {
        let csv = sample_report().csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Name,Device,Depth,Duration,cycles");
        assert_eq!(lines[1], "inner,cpu:0,2,0.250000000,100");
        assert_eq!(lines[2], "outer,cpu:0,1,0.500000000,");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_csv_is_deterministic() {
        let report = sample_report();
        assert_eq!(report.csv().unwrap(), report.csv().unwrap());
    }

    #[test]
    fn test_csv_quotes_awkward_names() {
        let report = Report::new(
            vec![call("add, fused", DeviceHandle::gpu(0), 1, &[])],
            BTreeMap::new(),
        );
        let csv = report.csv().unwrap();
        assert_eq!(csv, "Name,Device,Depth\n\"add, fused\",gpu:0,1\n");
    }

    #[test]
    fn test_merge_concatenates_and_folds() {
        let a = sample_report();
        let b = sample_report();
        let merged = a.merge(&b).unwrap();

        assert_eq!(merged.calls().len(), 4);
        assert_eq!(merged.calls()[0].name, "inner");
        assert_eq!(merged.calls()[3].name, "outer");
        assert_eq!(
            merged.device_metric(&DeviceHandle::cpu(0), "Duration"),
            Some(&MetricValue::Duration(1.5))
        );
        assert_eq!(
            merged.device_metric(&DeviceHandle::cpu(0), "cycles"),
            Some(&MetricValue::Count(200))
        );
    }

    #[test]
    fn test_merge_keeps_disjoint_devices() {
        let a = sample_report();
        let mut gpu_metrics = BTreeMap::new();
        gpu_metrics.insert(
            DeviceHandle::gpu(0),
            [("Duration".to_string(), MetricValue::Duration(1.0))]
                .into_iter()
                .collect(),
        );
        let b = Report::new(vec![], gpu_metrics);
        let merged = a.merge(&b).unwrap();
        assert_eq!(merged.device_metrics().len(), 2);
    }

    #[test]
    fn test_merge_mismatched_variant_fails() {
        let a = sample_report();
        let mut metrics = BTreeMap::new();
        metrics.insert(
            DeviceHandle::cpu(0),
            [("cycles".to_string(), MetricValue::Duration(1.0))]
                .into_iter()
                .collect(),
        );
        let b = Report::new(vec![], metrics);
        assert!(matches!(
            a.merge(&b),
            Err(ProfilingError::IncompatibleMetric { .. })
        ));
    }

    #[test]
    fn test_total_duration_counts_top_level_only() {
        let report = sample_report();
        assert_eq!(report.total_duration(None), 0.5);
        assert_eq!(report.total_duration(Some(&DeviceHandle::gpu(0))), 0.0);
    }

    #[test]
    fn test_json_round_trip() {
        let report = sample_report();
        let json = report.to_json().unwrap();
        assert!(json.contains("\"cpu:0\""));
        assert_eq!(Report::from_json(&json).unwrap(), report);
    }

    #[test]
    fn test_table_aggregates_by_name_and_device() {
        let calls = vec![
            call("matmul", DeviceHandle::gpu(0), 1, &[("Duration", MetricValue::Duration(0.25))]),
            call("relu", DeviceHandle::gpu(0), 1, &[("Duration", MetricValue::Duration(0.25))]),
            call("matmul", DeviceHandle::gpu(0), 1, &[("Duration", MetricValue::Duration(0.5))]),
        ];
        let report = Report::new(calls, BTreeMap::new());
        let table = report.table(true);
        let lines: Vec<&str> = table.lines().collect();

        assert!(lines[0].starts_with("Name"));
        assert!(lines[0].contains("Count"));
        assert!(lines[1].starts_with("matmul"));
        assert!(lines[1].contains("750000.00"));
        assert!(lines[1].contains("75.00%"));
        assert!(lines[2].starts_with("relu"));
        assert!(lines[2].contains("25.00%"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_table_flat_indents_nested_calls() {
        let table = sample_report().table(false);
        assert!(table.contains("\n  inner"));
        assert!(table.contains("Device summary:"));
        assert_eq!(table, sample_report().table(false));
    }

    #[test]
    fn test_table_reports_skipped_samples() {
        let calls = vec![
            call("load", DeviceHandle::cpu(0), 1, &[("moved", MetricValue::Count(4))]),
            call("load", DeviceHandle::cpu(0), 1, &[("moved", MetricValue::Bytes(4))]),
        ];
        let report = Report::new(calls, BTreeMap::new());

        let table = report.table(true);
        assert!(table.contains("(1 sample(s) skipped: metric type changed between calls)"));
        assert!(!report.table(false).contains("skipped"));
        assert!(!sample_report().table(true).contains("skipped"));
    }

    #[test]
    fn test_csv_prefixes_metrics_named_like_fixed_columns() {
        let report = Report::new(
            vec![call(
                "op",
                DeviceHandle::cpu(0),
                1,
                &[("Depth", MetricValue::Count(3)), ("Name", MetricValue::Text("x".to_string()))],
            )],
            BTreeMap::new(),
        );
        let csv = report.csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Name,Device,Depth,metric:Depth,metric:Name");
        assert_eq!(lines[1], "op,cpu:0,1,3,x");
    }

    #[test]
    fn test_call_count_falls_back_to_calls() {
        let report = sample_report();
        assert_eq!(report.call_count(&DeviceHandle::cpu(0)), 2);
        assert_eq!(report.call_count(&DeviceHandle::gpu(0)), 0);
    }
}
