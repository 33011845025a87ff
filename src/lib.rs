//! prommux library: discovery-driven reverse proxy for Prometheus exporters.

pub mod cli;
pub mod config;
pub mod discovery;
pub mod gateway;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod targets;

pub use config::GatewayConfig;
pub use gateway::{Gateway, GatewayError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
