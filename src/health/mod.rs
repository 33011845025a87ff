//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Liveness checks (liveness.rs):
//!     Resolved batch from the discovery loop
//!     → Probe each endpoint (bounded by timeouts.liveness_check)
//!     → Only 200 OK endpoints enter the snapshot
//!
//! Gateway readiness:
//!     lifecycle::readiness → GET /-/health
//! ```
//!
//! # Design Decisions
//! - Probing is opt-in (zero timeout disables it)
//! - A failed probe excludes the endpoint for one cycle only

pub mod liveness;

pub use liveness::{LivenessChecker, ProbeOutcome};
