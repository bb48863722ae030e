//! Metrics Tests
//!
//! Tests for request metrics collection and snapshot serialization.

use dermalens_shared::metrics::{MetricsCollector, DURATION_BUCKET_BOUNDS_MS};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_request_lifecycle() {
    let collector = MetricsCollector::new();

    collector.record_request();
    assert_eq!(collector.snapshot().active_requests, 1);

    collector.record_inference(Duration::from_millis(12));
    collector.record_response(200);
    collector.record_request_duration(Duration::from_millis(20));

    let snapshot = collector.snapshot();
    assert_eq!(snapshot.total_requests, 1);
    assert_eq!(snapshot.active_requests, 0);
    assert_eq!(snapshot.total_responses, 1);
    assert_eq!(snapshot.predictions, 1);
    assert_eq!(snapshot.average_inference_time_us, 12_000);
    assert_eq!(snapshot.duration_histogram[3], 1);
}

#[test]
fn test_error_response_counts() {
    let collector = MetricsCollector::new();

    collector.record_request();
    collector.record_error();
    collector.record_response(400);

    let snapshot = collector.snapshot();
    assert_eq!(snapshot.total_errors, 1);
    assert_eq!(snapshot.status_4xx, 1);
    assert_eq!(snapshot.active_requests, 0);
    assert_eq!(snapshot.error_rate(), 1.0);
    assert_eq!(snapshot.success_rate(), 0.0);
}

#[test]
fn test_duration_histogram_boundaries() {
    let collector = MetricsCollector::new();

    collector.record_request_duration(Duration::from_micros(500));
    collector.record_request_duration(Duration::from_millis(3));
    collector.record_request_duration(Duration::from_millis(25));
    collector.record_request_duration(Duration::from_millis(200));
    collector.record_request_duration(Duration::from_secs(2));
    collector.record_request_duration(Duration::from_secs(30));

    let snapshot = collector.snapshot();
    assert_eq!(snapshot.duration_histogram, [1, 1, 0, 1, 0, 1, 0, 1, 1]);
    assert_eq!(DURATION_BUCKET_BOUNDS_MS.len() + 1, snapshot.duration_histogram.len());
}

#[test]
fn test_snapshot_serializes_to_json() {
    let collector = MetricsCollector::new();
    collector.record_request();
    collector.record_response(200);

    let value = serde_json::to_value(collector.snapshot()).unwrap();
    assert_eq!(value["total_requests"], 1);
    assert_eq!(value["status_2xx"], 1);
    assert_eq!(value["duration_histogram"].as_array().unwrap().len(), 9);
    assert!(value.get("uptime_seconds").is_some());
}

#[test]
fn test_concurrent_mixed_updates() {
    let collector = Arc::new(MetricsCollector::new());
    let mut handles = vec![];

    for i in 0..8 {
        let collector_clone = Arc::clone(&collector);
        handles.push(thread::spawn(move || {
            for _ in 0..500 {
                collector_clone.record_request();
                if i % 2 == 0 {
                    collector_clone.record_response(200);
                } else {
                    collector_clone.record_error();
                    collector_clone.record_response(500);
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = collector.snapshot();
    assert_eq!(snapshot.total_requests, 4000);
    assert_eq!(snapshot.status_2xx, 2000);
    assert_eq!(snapshot.status_5xx, 2000);
    assert_eq!(snapshot.total_errors, 2000);
    assert_eq!(snapshot.active_requests, 0);
    assert_eq!(snapshot.success_rate(), 0.5);
}
