//! Proxy subsystem.
//!
//! # Data Flow
//! ```text
//! /proxy/{route_id}
//!     → TargetSnapshot lookup (RouteId → ResolvedEndpoint)
//!     → cache.rs (canonical URL → ProxyHandler, built once)
//!     → forward.rs (rewrite, strip hop-by-hop, stream upstream response)
//! ```
//!
//! # Design Decisions
//! - One connection pool shared by every handler
//! - Handlers survive snapshot replacement

pub mod cache;
pub mod forward;

pub use cache::ProxyCache;
pub use forward::{Forwarder, ProxyError, ProxyHandler};
