//! Health report handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, routing::get, Router};
use serde::Serialize;

use crate::http::response::Envelope;
use crate::observability::performance::{MemoryReport, PerformanceMonitor, ProcessUsage};

/// Basic health status.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: String,
    pub uptime: String,
    pub environment: String,
    pub memory: Option<MemoryReport>,
}

/// Process CPU usage since the previous sample.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuReport {
    pub usage_percent: String,
}

/// Health status plus build and platform information.
#[derive(Debug, Clone, Serialize)]
pub struct HealthDetails {
    #[serde(flatten)]
    pub status: HealthStatus,
    pub version: &'static str,
    pub os: &'static str,
    pub arch: &'static str,
    pub cpu: Option<CpuReport>,
}

/// Tracks process start for uptime reporting.
#[derive(Debug)]
pub struct HealthReporter {
    started: Instant,
    environment: String,
    performance: Arc<PerformanceMonitor>,
}

impl HealthReporter {
    pub fn new(environment: impl Into<String>, performance: Arc<PerformanceMonitor>) -> Self {
        Self {
            started: Instant::now(),
            environment: environment.into(),
            performance,
        }
    }

    pub fn status(&self) -> HealthStatus {
        let usage = self.performance.sample();
        self.status_from(usage.as_ref())
    }

    fn status_from(&self, usage: Option<&ProcessUsage>) -> HealthStatus {
        HealthStatus {
            status: "ok",
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            uptime: format_uptime(self.started.elapsed().as_secs()),
            environment: self.environment.clone(),
            memory: usage.map(MemoryReport::from),
        }
    }

    pub fn details(&self) -> HealthDetails {
        let usage = self.performance.sample();
        HealthDetails {
            status: self.status_from(usage.as_ref()),
            version: env!("CARGO_PKG_VERSION"),
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            cpu: usage.map(|u| CpuReport {
                usage_percent: format!("{:.1}%", u.cpu_percent),
            }),
        }
    }
}

/// Human readable uptime, e.g. `1d 2h 3m 4s`. Zero components are omitted,
/// seconds are shown when nothing else is.
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{}s", secs));
    }
    parts.join(" ")
}

async fn get_health(State(reporter): State<Arc<HealthReporter>>) -> Envelope<HealthStatus> {
    Envelope::ok(reporter.status())
}

async fn get_health_details(State(reporter): State<Arc<HealthReporter>>) -> Envelope<HealthDetails> {
    Envelope::ok(reporter.details())
}

/// `/health` and `/health/details`.
pub fn health_routes(reporter: Arc<HealthReporter>) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/health/details", get(get_health_details))
        .with_state(reporter)
}
