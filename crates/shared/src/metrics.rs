//! # Metrics Collection Module
//!
//! Lock-free request metrics for the classification service. The backend
//! records every request it routes and every forward pass it runs; the
//! health endpoint reports a [`MetricsSnapshot`] alongside model status.
//!
//! ## Metric Categories
//!
//! - **Request Metrics**: count, in-flight requests, latency distribution
//! - **Response Metrics**: status class counters and failures
//! - **Inference Metrics**: completed predictions and average forward-pass time

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

/// Upper bounds (inclusive, in milliseconds) of the first eight latency buckets
///
/// The ninth bucket holds everything slower than the last bound.
pub const DURATION_BUCKET_BOUNDS_MS: [u64; 8] = [1, 5, 10, 50, 100, 500, 1000, 5000];

/// Thread-safe metrics collector for the request pipeline
///
/// All counters use relaxed atomics; a snapshot may observe counters from
/// slightly different instants while requests are in flight.
///
/// ## Usage Example
///
/// ```rust
/// use dermalens_shared::metrics::MetricsCollector;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let metrics = Arc::new(MetricsCollector::new());
///
/// metrics.record_request();
/// metrics.record_inference(Duration::from_millis(40));
/// metrics.record_response(200);
/// metrics.record_request_duration(Duration::from_millis(55));
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.total_requests, 1);
/// assert_eq!(snapshot.predictions, 1);
/// ```
#[derive(Debug)]
pub struct MetricsCollector {
    /// Total number of requests received since startup
    total_requests: AtomicU64,

    /// Requests received but not yet answered
    active_requests: AtomicUsize,

    /// Total number of responses sent
    total_responses: AtomicU64,

    /// Requests whose handling produced an error body
    total_errors: AtomicU64,

    /// Request latency histogram, see [`DURATION_BUCKET_BOUNDS_MS`]
    duration_buckets: [AtomicU64; 9],

    status_2xx: AtomicU64,
    status_4xx: AtomicU64,
    status_5xx: AtomicU64,

    /// Completed forward passes
    predictions: AtomicU64,

    /// Sum of forward-pass durations in microseconds
    inference_time_us: AtomicU64,

    start_time: Instant,
}

impl MetricsCollector {
    /// Creates a collector with all counters at zero
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            active_requests: AtomicUsize::new(0),
            total_responses: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            duration_buckets: Default::default(),
            status_2xx: AtomicU64::new(0),
            status_4xx: AtomicU64::new(0),
            status_5xx: AtomicU64::new(0),
            predictions: AtomicU64::new(0),
            inference_time_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Records the arrival of a request
    ///
    /// Must be paired with exactly one [`record_response`](Self::record_response).
    #[inline]
    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.active_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a response with its status code
    ///
    /// Decrements the in-flight counter and classifies the status.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use dermalens_shared::metrics::MetricsCollector;
    ///
    /// let metrics = MetricsCollector::new();
    /// metrics.record_request();
    /// metrics.record_response(413);
    ///
    /// let snapshot = metrics.snapshot();
    /// assert_eq!(snapshot.status_4xx, 1);
    /// assert_eq!(snapshot.active_requests, 0);
    /// ```
    #[inline]
    pub fn record_response(&self, status_code: u16) {
        self.total_responses.fetch_add(1, Ordering::Relaxed);
        // Saturating so an unpaired response cannot wrap the gauge
        let _ = self
            .active_requests
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));

        match status_code {
            200..=299 => {
                self.status_2xx.fetch_add(1, Ordering::Relaxed);
            }
            400..=499 => {
                self.status_4xx.fetch_add(1, Ordering::Relaxed);
            }
            500..=599 => {
                self.status_5xx.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                warn!(status_code = status_code, "Unclassified HTTP status code recorded");
            }
        }
    }

    /// Records that a request ended with an error body
    ///
    /// Called in addition to [`record_response`](Self::record_response).
    #[inline]
    pub fn record_error(&self) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records total request latency into the histogram
    ///
    /// # Examples
    ///
    /// ```rust
    /// use dermalens_shared::metrics::MetricsCollector;
    /// use std::time::Duration;
    ///
    /// let metrics = MetricsCollector::new();
    /// metrics.record_request_duration(Duration::from_millis(25));
    ///
    /// // 25ms falls in the <= 50ms bucket
    /// assert_eq!(metrics.snapshot().duration_histogram[3], 1);
    /// ```
    #[inline]
    pub fn record_request_duration(&self, duration: Duration) {
        let duration_ms = duration.as_millis() as u64;

        let bucket_index = match duration_ms {
            0..=1 => 0,
            2..=5 => 1,
            6..=10 => 2,
            11..=50 => 3,
            51..=100 => 4,
            101..=500 => 5,
            501..=1000 => 6,
            1001..=5000 => 7,
            _ => 8,
        };

        self.duration_buckets[bucket_index].fetch_add(1, Ordering::Relaxed);
    }

    /// Records one completed forward pass and its duration
    #[inline]
    pub fn record_inference(&self, duration: Duration) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
        self.inference_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut duration_histogram = [0u64; 9];
        for (slot, bucket) in duration_histogram.iter_mut().zip(&self.duration_buckets) {
            *slot = bucket.load(Ordering::Relaxed);
        }

        let predictions = self.predictions.load(Ordering::Relaxed);
        let inference_time_us = self.inference_time_us.load(Ordering::Relaxed);
        let average_inference_time_us = if predictions > 0 {
            inference_time_us / predictions
        } else {
            0
        };

        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            active_requests: self.active_requests.load(Ordering::Relaxed),
            total_responses: self.total_responses.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
            status_2xx: self.status_2xx.load(Ordering::Relaxed),
            status_4xx: self.status_4xx.load(Ordering::Relaxed),
            status_5xx: self.status_5xx.load(Ordering::Relaxed),
            predictions,
            average_inference_time_us,
            duration_histogram,
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable copy of the collector's counters
///
/// Serializes to the `requests` object of the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Total number of requests received since startup
    pub total_requests: u64,

    /// Number of requests currently being processed
    pub active_requests: usize,

    /// Total number of responses sent
    pub total_responses: u64,

    /// Requests that ended with an error body
    pub total_errors: u64,

    /// Responses with a 2xx status
    pub status_2xx: u64,

    /// Responses with a 4xx status
    pub status_4xx: u64,

    /// Responses with a 5xx status
    pub status_5xx: u64,

    /// Completed forward passes
    pub predictions: u64,

    /// Mean forward-pass duration in microseconds
    pub average_inference_time_us: u64,

    /// Request latency histogram, see [`DURATION_BUCKET_BOUNDS_MS`]
    pub duration_histogram: [u64; 9],

    /// Seconds since the collector was created
    pub uptime_seconds: u64,
}

impl MetricsSnapshot {
    /// Fraction of answered requests that got a 2xx status
    ///
    /// Returns 0.0 when nothing has been answered yet.
    pub fn success_rate(&self) -> f64 {
        let total_completed = self.status_2xx + self.status_4xx + self.status_5xx;
        if total_completed == 0 {
            return 0.0;
        }

        self.status_2xx as f64 / total_completed as f64
    }

    /// Fraction of received requests that ended with an error body
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }

        self.total_errors as f64 / self.total_requests as f64
    }

    /// Upper bound in milliseconds of the bucket holding the 95th percentile
    ///
    /// Coarse by construction; returns 0 when no durations were recorded.
    pub fn p95_response_time_ms(&self) -> u64 {
        let total: u64 = self.duration_histogram.iter().sum();
        if total == 0 {
            return 0;
        }

        let threshold = (total as f64 * 0.95).ceil() as u64;
        let mut cumulative = 0u64;

        for (i, &count) in self.duration_histogram.iter().enumerate() {
            cumulative += count;
            if cumulative >= threshold {
                return DURATION_BUCKET_BOUNDS_MS
                    .get(i)
                    .copied()
                    .unwrap_or(DURATION_BUCKET_BOUNDS_MS[7]);
            }
        }

        DURATION_BUCKET_BOUNDS_MS[7]
    }
}
