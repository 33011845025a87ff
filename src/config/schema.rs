//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits: deserialized from the TOML file and
//! serialized back out by `GET /status`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observability::LogFormat;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, port).
    pub listener: ListenerConfig,

    /// Docker discovery settings.
    pub discovery: DiscoveryConfig,

    /// Labels republished on `/discover`.
    pub labels: LabelConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Address to bind, without port (e.g., "0.0.0.0").
    pub bind_address: String,

    pub port: u16,
}

impl ListenerConfig {
    /// `host:port` form of the listen address, bracketing IPv6 literals.
    pub fn socket_address(&self) -> String {
        if self.bind_address.contains(':') && !self.bind_address.starts_with('[') {
            format!("[{}]:{}", self.bind_address, self.port)
        } else {
            format!("{}:{}", self.bind_address, self.port)
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 11298,
        }
    }
}

/// Docker discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Docker daemon address (`unix://`, `tcp://` or `http://`).
    pub host: String,

    /// Port used for containers that expose none.
    pub port: u16,

    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,

    /// Upper bound of a single container listing.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Docker list filters (name → values).
    pub filters: BTreeMap<String, Vec<String>>,

    /// Host used for containers running in host network mode.
    pub host_networking_host: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            host: "unix:///var/run/docker.sock".to_string(),
            port: 80,
            refresh_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(30),
            filters: BTreeMap::new(),
            host_networking_host: "localhost".to_string(),
        }
    }
}

/// Label republishing configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct LabelConfig {
    /// Republish the discovered labels of each target.
    pub include_labels: bool,

    /// Only label names matching this regex are republished.
    pub label_regex: Option<String>,

    /// Static labels added to every target.
    pub additional_labels: BTreeMap<String, String>,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connect timeout of proxied requests.
    #[serde(with = "humantime_serde")]
    pub proxy: Duration,

    /// Liveness probe timeout. Zero disables probing.
    #[serde(with = "humantime_serde")]
    pub liveness_check: Duration,
}

impl TimeoutConfig {
    pub fn liveness_enabled(&self) -> bool {
        !self.liveness_check.is_zero()
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            proxy: Duration::from_secs(30),
            liveness_check: Duration::ZERO,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level or `EnvFilter` directives.
    pub log_level: String,

    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
        }
    }
}
