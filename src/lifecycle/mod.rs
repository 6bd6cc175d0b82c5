//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Load config → Validate → Install panic hook (panic.rs)
//!     → Build pipeline → Bind listener → Log startup
//!
//! Shutdown (shutdown.rs):
//!     Signal received (signals.rs) → Log shutdown → Broadcast
//!     → Server drains → Latency and performance reporters stop
//! ```

pub mod panic;
pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
