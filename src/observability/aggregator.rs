//! Rolling per-route latency aggregation.
//!
//! # Responsibilities
//! - Keep the most recent latency samples per `METHOD:PATH` key
//! - Summarize count / avg / min / max / p95 on a fixed interval
//! - Emit one structured log entry per interval
//!
//! # Design Decisions
//! - Bounded `VecDeque` per key, oldest sample evicted first
//! - `record` holds only the key's shard lock, never blocks on the reporter
//! - p95 is nearest-rank: `sorted[floor(0.95 * n)]`, no interpolation

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Serialize, Serializer};
use tokio::sync::broadcast;
use tokio::time;

/// Default number of samples kept per key.
pub const DEFAULT_SERIES_CAPACITY: usize = 100;

/// Aggregated latency statistics for one key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub count: usize,
    #[serde(serialize_with = "fixed2")]
    pub avg: f64,
    #[serde(serialize_with = "fixed2")]
    pub min: f64,
    #[serde(serialize_with = "fixed2")]
    pub max: f64,
    #[serde(serialize_with = "fixed2")]
    pub p95: f64,
}

fn fixed2<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{:.2}", value))
}

impl LatencySummary {
    /// Summarize a non-empty sample set.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();
        let rank = ((count as f64) * 0.95).floor() as usize;

        Some(Self {
            count,
            avg: sum / count as f64,
            min: sorted[0],
            max: sorted[count - 1],
            p95: sorted[rank.min(count - 1)],
        })
    }
}

/// Builds the `METHOD:PATH` key for a request.
pub fn metric_key(method: &str, path: &str) -> String {
    format!("{}:{}", method, path)
}

/// Thread-safe rolling latency store.
#[derive(Debug)]
pub struct MetricsAggregator {
    series: DashMap<String, VecDeque<f64>>,
    capacity: usize,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_SERIES_CAPACITY)
    }
}

impl MetricsAggregator {
    pub fn new(capacity: usize) -> Self {
        Self {
            series: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a sample, evicting the oldest once the series is full.
    pub fn record(&self, key: &str, duration_ms: f64) {
        if let Some(mut samples) = self.series.get_mut(key) {
            push_bounded(&mut samples, duration_ms, self.capacity);
            return;
        }
        let mut samples = self
            .series
            .entry(key.to_string())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity + 1));
        push_bounded(&mut samples, duration_ms, self.capacity);
    }

    /// Record a completed request.
    pub fn record_request(&self, method: &str, path: &str, elapsed: Duration) {
        self.record(&metric_key(method, path), elapsed.as_secs_f64() * 1000.0);
    }

    /// Copy of the current series for `key`, oldest first.
    pub fn series(&self, key: &str) -> Option<Vec<f64>> {
        self.series.get(key).map(|s| s.iter().copied().collect())
    }

    /// Number of keys seen so far.
    pub fn key_count(&self) -> usize {
        self.series.len()
    }

    /// Summaries for every key holding at least one sample, ordered by key.
    pub fn summarize(&self) -> BTreeMap<String, LatencySummary> {
        self.series
            .iter()
            .filter_map(|entry| {
                let samples: Vec<f64> = entry.value().iter().copied().collect();
                LatencySummary::from_samples(&samples).map(|s| (entry.key().clone(), s))
            })
            .collect()
    }

    /// Log the current summaries. Returns `false` when there was nothing to report.
    pub fn report(&self) -> bool {
        let summaries = self.summarize();
        if summaries.is_empty() {
            return false;
        }
        match serde_json::to_string(&summaries) {
            Ok(json) => {
                tracing::debug!(target: "HTTP", metrics = %json, "Request metrics (last minute)");
            }
            Err(e) => {
                tracing::error!(target: "HTTP", error = %e, "Failed to serialize request metrics");
            }
        }
        true
    }

    /// Report on a fixed interval until shutdown.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = interval.as_secs(), "Metrics reporter starting");

        let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.report();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Metrics reporter received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

fn push_bounded(samples: &mut VecDeque<f64>, value: f64, capacity: usize) {
    samples.push_back(value);
    while samples.len() > capacity {
        samples.pop_front();
    }
}
