//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-client request counting, 400 / 429 rejections)
//!     → Pass to tracer
//!
//! Logged request data:
//!     → redact.rs (mask sensitive keys before anything is written)
//!
//! Outgoing response:
//!     → headers.rs (X-Powered-By, ETag, strip CORS allowances)
//! ```
//!
//! # Design Decisions
//! - Fail closed: requests without a client identity are rejected
//! - Redaction never mutates the data the handler sees

pub mod headers;
pub mod rate_limit;
pub mod redact;

pub use rate_limit::{RateLimitError, RateLimiter};
pub use redact::Redactor;
