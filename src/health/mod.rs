//! Health reporting.
//!
//! # Responsibilities
//! - Report liveness with uptime, environment and memory (`/health`)
//! - Report build, platform and CPU details (`/health/details`)
//!
//! # Design Decisions
//! - One reporter instance is created at startup and injected into the
//!   routes; there is no global accessor
//! - Health routes are excluded from tracing and rate limiting by default

pub mod report;

pub use report::{health_routes, HealthReporter};
