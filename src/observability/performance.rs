//! Process resource sampling.
//!
//! # Responsibilities
//! - Sample resident memory, virtual memory and CPU usage of this process
//! - Log a snapshot on a fixed interval, with memory growth since startup
//! - Serve the latest figures to the health endpoints
//!
//! # Design Decisions
//! - A single `sysinfo::System` behind a mutex, refreshed for this pid only
//! - CPU usage is relative to the previous refresh, so the first sample reads 0

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::broadcast;
use tokio::time;

/// One resource sample of the current process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessUsage {
    pub rss_bytes: u64,
    pub virtual_bytes: u64,
    pub cpu_percent: f32,
}

/// Memory figures as reported by the health endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryReport {
    pub rss: String,
    #[serde(rename = "virtual")]
    pub virtual_memory: String,
}

impl From<&ProcessUsage> for MemoryReport {
    fn from(usage: &ProcessUsage) -> Self {
        Self {
            rss: format_bytes(usage.rss_bytes),
            virtual_memory: format_bytes(usage.virtual_bytes),
        }
    }
}

/// `1536` → `1.50 KB`. Units stop at GB.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, UNITS[unit])
}

/// Samples resource usage of the running process.
pub struct PerformanceMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    baseline_rss: u64,
}

impl std::fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("pid", &self.pid)
            .field("baseline_rss", &self.baseline_rss)
            .finish()
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!(target: "Performance", error = %e, "Cannot resolve own pid, sampling disabled");
                None
            }
        };
        let mut monitor = Self {
            system: Mutex::new(System::new()),
            pid,
            baseline_rss: 0,
        };
        monitor.baseline_rss = monitor.sample().map(|u| u.rss_bytes).unwrap_or(0);
        monitor
    }

    /// Refresh and read this process's usage.
    pub fn sample(&self) -> Option<ProcessUsage> {
        let pid = self.pid?;
        let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).map(|process| ProcessUsage {
            rss_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
            cpu_percent: process.cpu_usage(),
        })
    }

    /// Resident memory at startup.
    pub fn baseline_rss(&self) -> u64 {
        self.baseline_rss
    }

    /// Log one snapshot. Returns the sample that was logged.
    pub fn report(&self) -> Option<ProcessUsage> {
        let usage = self.sample()?;
        let growth = usage.rss_bytes as i64 - self.baseline_rss as i64;
        tracing::debug!(
            target: "Performance",
            rss = %format_bytes(usage.rss_bytes),
            virtual_memory = %format_bytes(usage.virtual_bytes),
            cpu_percent = %format!("{:.1}", usage.cpu_percent),
            rss_growth_bytes = growth,
            "Performance metrics"
        );
        Some(usage)
    }

    /// Report on a fixed interval until shutdown.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = interval.as_secs(), "Performance monitor starting");

        let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.report();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Performance monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024 * 1024), "3072.00 GB");
    }

    #[test]
    fn test_sample_reads_own_process() {
        let monitor = PerformanceMonitor::new();
        let usage = monitor.sample().unwrap();
        assert!(usage.rss_bytes > 0);
        assert!(usage.cpu_percent >= 0.0);
    }

    #[test]
    fn test_memory_report_is_human_readable() {
        let usage = ProcessUsage {
            rss_bytes: 2048,
            virtual_bytes: 1024 * 1024,
            cpu_percent: 0.0,
        };
        let json = serde_json::to_value(MemoryReport::from(&usage)).unwrap();
        assert_eq!(json["rss"], "2.00 KB");
        assert_eq!(json["virtual"], "1.00 MB");
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_stops_on_shutdown() {
        let monitor = Arc::new(PerformanceMonitor::new());
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(monitor.run(Duration::from_secs(300), rx));

        time::sleep(Duration::from_secs(301)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
