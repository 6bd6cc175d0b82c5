//! Request pipeline for HTTP services.
//!
//! Per-client rate limiting, request tracing with redacted context capture,
//! rolling latency statistics and a uniform response envelope.

pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod security;

pub use config::schema::PipelineConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::Pipeline;
