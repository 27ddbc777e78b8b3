//! Request counters and latency statistics for the API service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Latency samples kept per endpoint before the oldest half is dropped.
const MAX_SAMPLES: usize = 2000;

/// Metrics collector for the request loop
pub struct ServiceMetrics {
    /// Requests answered (successfully or not)
    pub requests_handled: AtomicU64,
    /// Requests answered with an error envelope
    pub requests_failed: AtomicU64,
    /// Failures by error kind
    failures_by_kind: RwLock<HashMap<String, u64>>,
    /// Handling times per endpoint (in microseconds)
    latencies: RwLock<HashMap<String, Vec<u64>>>,
    start_time: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_handled: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            failures_by_kind: RwLock::new(HashMap::new()),
            latencies: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record one answered request; `error_kind` is set for failures
    pub fn record_request(&self, endpoint: &str, elapsed: Duration, error_kind: Option<&str>) {
        self.requests_handled.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut latencies) = self.latencies.write() {
            let samples = latencies.entry(endpoint.to_string()).or_default();
            samples.push(elapsed.as_micros() as u64);
            if samples.len() > MAX_SAMPLES {
                samples.drain(0..MAX_SAMPLES / 2);
            }
        }

        if let Some(kind) = error_kind {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
            if let Ok(mut by_kind) = self.failures_by_kind.write() {
                *by_kind.entry(kind.to_string()).or_insert(0) += 1;
            }
        }
    }

    /// Latency statistics per endpoint
    pub fn get_endpoint_stats(&self) -> HashMap<String, EndpointStats> {
        let Ok(latencies) = self.latencies.read() else {
            return HashMap::new();
        };

        latencies
            .iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(endpoint, samples)| {
                let mut sorted = samples.clone();
                sorted.sort_unstable();
                let count = sorted.len();
                let sum: u64 = sorted.iter().sum();
                let stats = EndpointStats {
                    calls: count as u64,
                    mean_us: sum / count as u64,
                    p50_us: sorted[count / 2],
                    p99_us: sorted[((count as f64 * 0.99) as usize).min(count - 1)],
                    max_us: sorted[count - 1],
                };
                (endpoint.clone(), stats)
            })
            .collect()
    }

    pub fn get_failures_by_kind(&self) -> HashMap<String, u64> {
        self.failures_by_kind
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Requests per second since start
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests_handled.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let handled = self.requests_handled.load(Ordering::Relaxed);
        let failed = self.requests_failed.load(Ordering::Relaxed);

        info!(
            handled = handled,
            failed = failed,
            throughput = format!("{:.2} req/s", self.get_throughput()),
            "Service metrics summary"
        );

        let mut endpoints: Vec<_> = self.get_endpoint_stats().into_iter().collect();
        endpoints.sort_by(|a, b| a.0.cmp(&b.0));
        for (endpoint, stats) in &endpoints {
            info!(
                endpoint = %endpoint,
                calls = stats.calls,
                mean_us = stats.mean_us,
                p50_us = stats.p50_us,
                p99_us = stats.p99_us,
                max_us = stats.max_us,
                "Endpoint latency"
            );
        }

        for (kind, count) in self.get_failures_by_kind() {
            info!(kind = %kind, count = count, "Failures by kind");
        }
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics for one endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointStats {
    pub calls: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Periodic summary logger
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
