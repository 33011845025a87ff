//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and gauges on an injected MetricsSink)
//!
//! Consumers:
//!     → stdout (JSON or text lines)
//!     → GET /metrics (Prometheus text exposition)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through the access log
//! - No process-global metrics recorder

pub mod logging;
pub mod metrics;

pub use self::logging::LogFormat;
pub use self::metrics::{MetricsSink, NoopSink, PrometheusSink, RecordingSink};
