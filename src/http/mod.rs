//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, trace span)
//!     → middleware.rs (access log, request counters)
//!     → handlers.rs (/discover, /proxy/{route_id}, /status, /-/health, /metrics)
//!     → Send to client
//! ```

pub mod handlers;
pub mod middleware;
pub mod server;

pub use server::{AppState, HttpServer};
