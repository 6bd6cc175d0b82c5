//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request tracer produces:
//!     → logging.rs (structured log events, targets HTTP / RateLimit / Response)
//!     → aggregator.rs (rolling latency per METHOD:PATH, periodic summary)
//!     → metrics.rs (Prometheus counters and histograms)
//!
//! Background:
//!     → performance.rs (periodic process CPU / memory snapshot)
//! ```
//!
//! # Design Decisions
//! - Structured logging for machine parsing
//! - Correlation id flows through every request log line
//! - Metric updates are cheap and never block request handling

pub mod aggregator;
pub mod logging;
pub mod metrics;
pub mod performance;

pub use aggregator::{LatencySummary, MetricsAggregator};
pub use performance::PerformanceMonitor;
