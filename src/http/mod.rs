//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, connect info)
//!     → [rate limiter]
//!     → tracer.rs (request id, context capture, completion summary)
//!     → request.rs (context capture helpers)
//!     → [timeout, body limit]
//!     → extract.rs (body / path extraction, rejections as envelopes)
//!     → handler
//!     → response.rs (uniform success / failure envelope)
//!     → Send to client
//! ```

pub mod extract;
pub mod request;
pub mod response;
pub mod server;
pub mod tracer;

pub use extract::{ApiJson, ApiPath};
pub use request::{RequestContext, RequestId};
pub use response::{Envelope, HandlerError, ResponseEnvelope};
pub use server::HttpServer;
pub use tracer::{RequestTracer, TraceError};
