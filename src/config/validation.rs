//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports and intervals > 0)
//! - Compile the label regex and check additional label names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use regex::Regex;

use crate::config::schema::{GatewayConfig, LabelConfig};
use crate::targets::labels::is_valid_label_name;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must be a non-zero port")]
    ZeroPort { field: &'static str },

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("labels.label_regex '{pattern}' is invalid: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("labels.additional_labels contains invalid label name '{name}'")]
    InvalidLabelName { name: String },
}

/// Check every field, collecting all problems.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.is_empty() {
        errors.push(ValidationError::Empty {
            field: "listener.bind_address",
        });
    }
    if config.listener.port == 0 {
        errors.push(ValidationError::ZeroPort {
            field: "listener.port",
        });
    }
    if config.discovery.host.is_empty() {
        errors.push(ValidationError::Empty {
            field: "discovery.host",
        });
    }
    if config.discovery.port == 0 {
        errors.push(ValidationError::ZeroPort {
            field: "discovery.port",
        });
    }
    if config.discovery.refresh_interval.is_zero() {
        errors.push(ValidationError::ZeroDuration {
            field: "discovery.refresh_interval",
        });
    }
    if config.discovery.timeout.is_zero() {
        errors.push(ValidationError::ZeroDuration {
            field: "discovery.timeout",
        });
    }
    if config.timeouts.proxy.is_zero() {
        errors.push(ValidationError::ZeroDuration {
            field: "timeouts.proxy",
        });
    }

    if let Err(e) = compile_label_regex(&config.labels) {
        errors.push(e);
    }
    for name in config.labels.additional_labels.keys() {
        if !is_valid_label_name(name) {
            errors.push(ValidationError::InvalidLabelName { name: name.clone() });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Compile `labels.label_regex`. An absent or empty pattern disables filtering.
pub fn compile_label_regex(labels: &LabelConfig) -> Result<Option<Regex>, ValidationError> {
    match labels.label_regex.as_deref() {
        None | Some("") => Ok(None),
        Some(pattern) => Regex::new(pattern)
            .map(Some)
            .map_err(|source| ValidationError::InvalidRegex {
                pattern: pattern.to_string(),
                source,
            }),
    }
}
