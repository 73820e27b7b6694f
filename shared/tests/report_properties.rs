//! Integration test: report-level properties (merge, CSV, JSON)

use callscope_shared::{
    CallRecord, DeviceHandle, MetricMap, MetricValue, ProfilingError, Report,
};
use std::collections::BTreeMap;

fn call(name: &str, device: &DeviceHandle, depth: u32, secs: f64) -> CallRecord {
    let mut metrics = MetricMap::new();
    metrics.insert("Duration".to_string(), MetricValue::Duration(secs));
    CallRecord::new(name, device.clone(), depth, metrics)
}

fn report(prefix: &str, n: usize) -> Report {
    let gpu = DeviceHandle::gpu(0);
    let calls: Vec<CallRecord> = (0..n)
        .map(|i| call(&format!("{}{}", prefix, i), &gpu, 1, 0.001 * (i + 1) as f64))
        .collect();

    let mut totals = MetricMap::new();
    totals.insert(
        "Duration".to_string(),
        MetricValue::Duration(calls.iter().filter_map(|c| c.duration_secs()).sum()),
    );
    totals.insert("Calls".to_string(), MetricValue::Count(n as u64));
    let mut device_metrics = BTreeMap::new();
    device_metrics.insert(gpu, totals);

    Report::new(calls, device_metrics)
}

fn names(report: &Report) -> Vec<&str> {
    report.calls().iter().map(|c| c.name.as_str()).collect()
}

#[test]
fn test_merge_is_associative_over_calls() {
    let a = report("a", 2);
    let b = report("b", 3);
    let c = report("c", 1);

    let left = a.merge(&b).unwrap().merge(&c).unwrap();
    let right = a.merge(&b.merge(&c).unwrap()).unwrap();

    assert_eq!(names(&left), names(&right));
    assert_eq!(names(&left), vec!["a0", "a1", "b0", "b1", "b2", "c0"]);
    assert_eq!(
        left.device_metric(&DeviceHandle::gpu(0), "Calls"),
        Some(&MetricValue::Count(6))
    );
}

#[test]
fn test_merge_with_empty_report() {
    let a = report("a", 2);
    assert_eq!(a.merge(&Report::default()).unwrap(), a);
    assert_eq!(Report::default().merge(&a).unwrap(), a);
}

#[test]
fn test_merge_rejects_mismatched_variants() {
    let a = report("a", 1);

    let mut totals = MetricMap::new();
    totals.insert("Calls".to_string(), MetricValue::Bytes(1));
    let mut device_metrics = BTreeMap::new();
    device_metrics.insert(DeviceHandle::gpu(0), totals);
    let b = Report::new(Vec::new(), device_metrics);

    let err = a.merge(&b).unwrap_err();
    assert_eq!(
        err,
        ProfilingError::IncompatibleMetric {
            name: "Calls".to_string(),
            left: "count",
            right: "bytes",
        }
    );
}

#[test]
fn test_csv_is_deterministic() {
    let cpu = DeviceHandle::cpu(0);
    let mut extra = MetricMap::new();
    extra.insert("cache_misses".to_string(), MetricValue::Count(42));
    extra.insert("Duration".to_string(), MetricValue::Duration(0.5));
    let calls = vec![
        call("matmul", &cpu, 1, 0.25),
        CallRecord::new("softmax", cpu.clone(), 2, extra),
    ];
    let report = Report::new(calls, BTreeMap::new());

    let first = report.csv().unwrap();
    let second = report.clone().csv().unwrap();
    assert_eq!(first, second);

    let lines: Vec<&str> = first.lines().collect();
    assert_eq!(lines[0], "Name,Device,Depth,Duration,cache_misses");
    assert_eq!(lines[1], "matmul,cpu:0,1,0.250000000,");
    assert_eq!(lines[2], "softmax,cpu:0,2,0.500000000,42");
}

#[test]
fn test_json_round_trip_preserves_report() {
    let original = report("op", 3);
    let json = original.to_json().unwrap();
    assert!(json.contains("\"gpu:0\""));

    let restored = Report::from_json(&json).unwrap();
    assert_eq!(restored, original);
    assert_eq!(restored.csv().unwrap(), original.csv().unwrap());
}

#[test]
fn test_table_is_deterministic() {
    let merged = report("a", 2).merge(&report("a", 2)).unwrap();
    assert_eq!(merged.table(true), merged.table(true));
    assert_eq!(merged.table(false), merged.table(false));
}
