//! Configuration loading from disk and command-line values.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("--{flag} is not valid JSON: {source}")]
    Json {
        flag: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML file without semantic checks.
pub fn read_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Decode a JSON-valued command-line flag.
pub fn parse_json_flag<T: DeserializeOwned>(flag: &'static str, value: &str) -> Result<T, ConfigError> {
    serde_json::from_str(value).map_err(|source| ConfigError::Json { flag, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn write_temp(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("prommux-{}-{name}.toml", std::process::id()));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn loads_valid_file() {
        let path = write_temp("valid", "[listener]\nport = 9000\n");
        let config = load_config(&path).unwrap();
        assert_eq!(config.listener.port, 9000);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn reports_validation_errors() {
        let path = write_temp("invalid", "[listener]\nport = 0\n");
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
        assert!(err.to_string().contains("listener.port"));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_config(Path::new("/nonexistent/prommux.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn unknown_types_fail_to_parse() {
        let path = write_temp("malformed", "[listener]\nport = \"eighty\"\n");
        assert!(matches!(read_config(&path), Err(ConfigError::Parse(_))));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn json_flags() {
        let labels: BTreeMap<String, String> =
            parse_json_flag("additional-labels", r#"{"env":"prod"}"#).unwrap();
        assert_eq!(labels["env"], "prod");

        let err = parse_json_flag::<BTreeMap<String, String>>("additional-labels", "{").unwrap_err();
        assert!(err.to_string().starts_with("--additional-labels"));
    }
}
