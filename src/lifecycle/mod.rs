//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Load config → Validate → Build gateway → Start discovery loop → Bind listener
//!
//! Readiness (readiness.rs):
//!     Discovery cycle applied → ready = true → subscribers notified
//!     Discovery feed lost     → ready = false → /-/health answers 503
//!
//! Shutdown (shutdown.rs):
//!     SIGTERM/SIGINT → cancel token → discovery loop exits,
//!     server stops accepting and drains in-flight requests
//!     Discovery loop or server exits → the other one is shut down too
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - One cancellation token tree for every long-running task
//! - In-flight proxied requests are never cancelled, only drained

pub mod readiness;
pub mod shutdown;

pub use readiness::{ReadinessSignal, Subscription};
pub use shutdown::Shutdown;
