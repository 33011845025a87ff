//! Command-line interface.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::loader::{parse_json_flag, read_config};
use crate::config::{validate_config, ConfigError, GatewayConfig};
use crate::observability::LogFormat;

#[derive(Parser, Debug)]
#[command(name = "prommux", version)]
#[command(about = "HTTP service discovery and reverse proxy for Prometheus exporters", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the gateway (default)
    Server(ServerArgs),
    /// Probe a running gateway's health endpoint
    Healthcheck(HealthcheckArgs),
}

/// Flags of the `server` subcommand. Every flag overrides the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct ServerArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level or filter directives (error, warn, info, debug)
    #[arg(short, long)]
    pub log_level: Option<String>,

    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Address of the Docker API
    #[arg(short = 'd', long)]
    pub docker_address: Option<String>,

    /// Port scraped on containers exposing none
    #[arg(long)]
    pub docker_port: Option<u16>,

    /// Address to listen on
    #[arg(short, long)]
    pub bind_address: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Interval between Docker API polls (e.g. 30s)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub docker_refresh_interval: Option<Duration>,

    /// Timeout of a single Docker API poll
    #[arg(short = 'o', long, value_parser = humantime::parse_duration)]
    pub discover_timeout: Option<Duration>,

    /// Connect timeout of proxied requests
    #[arg(short = 't', long, value_parser = humantime::parse_duration)]
    pub proxy_timeout: Option<Duration>,

    /// Probe endpoints before registering them; 0s disables
    #[arg(long, value_parser = humantime::parse_duration)]
    pub liveness_timeout: Option<Duration>,

    /// Republish container labels on /discover
    #[arg(short, long)]
    pub include_labels: bool,

    /// Regex selecting the republished label names
    #[arg(short = 'r', long)]
    pub regexp_labels: Option<String>,

    /// Docker container filters as JSON, e.g. {"label":["prommux.enabled=true"]}
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Labels added to every /discover entry as flat JSON
    #[arg(short, long)]
    pub additional_labels: Option<String>,

    /// Host used for containers in host network mode
    #[arg(long)]
    pub host_networking_host: Option<String>,
}

impl ServerArgs {
    /// Load the config file (or defaults), apply the flags and validate.
    pub fn load_config(&self) -> Result<GatewayConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => GatewayConfig::default(),
        };
        self.apply(&mut config)?;
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }

    /// Override `config` with every flag that was given.
    pub fn apply(&self, config: &mut GatewayConfig) -> Result<(), ConfigError> {
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
        if let Some(host) = &self.docker_address {
            config.discovery.host = host.clone();
        }
        if let Some(port) = self.docker_port {
            config.discovery.port = port;
        }
        if let Some(address) = &self.bind_address {
            config.listener.bind_address = address.clone();
        }
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(interval) = self.docker_refresh_interval {
            config.discovery.refresh_interval = interval;
        }
        if let Some(timeout) = self.discover_timeout {
            config.discovery.timeout = timeout;
        }
        if let Some(timeout) = self.proxy_timeout {
            config.timeouts.proxy = timeout;
        }
        if let Some(timeout) = self.liveness_timeout {
            config.timeouts.liveness_check = timeout;
        }
        if self.include_labels {
            config.labels.include_labels = true;
        }
        if let Some(regex) = &self.regexp_labels {
            config.labels.label_regex = Some(regex.clone());
        }
        if let Some(filter) = non_empty(&self.filter) {
            config.discovery.filters = parse_json_flag::<BTreeMap<String, Vec<String>>>("filter", filter)?;
        }
        if let Some(labels) = non_empty(&self.additional_labels) {
            config.labels.additional_labels = parse_json_flag::<BTreeMap<String, String>>("additional-labels", labels)?;
        }
        if let Some(host) = &self.host_networking_host {
            config.discovery.host_networking_host = host.clone();
        }
        Ok(())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Flags of the `healthcheck` subcommand.
#[derive(Args, Debug, Clone)]
pub struct HealthcheckArgs {
    /// Full URL to probe; overrides --address and --port
    #[arg(short, long)]
    pub url: Option<String>,

    #[arg(short, long, default_value = "127.0.0.1")]
    pub address: String,

    #[arg(short, long, default_value_t = 11298)]
    pub port: u16,

    #[arg(short, long, default_value = "30s", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    #[arg(short, long, default_value = "info")]
    pub log_level: String,
}

impl HealthcheckArgs {
    pub fn target_url(&self) -> String {
        if let Some(url) = self.url.as_ref().filter(|u| !u.is_empty()) {
            return url.clone();
        }
        let host = if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]", self.address)
        } else {
            self.address.clone()
        };
        format!("http://{host}:{}/-/health", self.port)
    }
}

/// Error of the `healthcheck` subcommand.
#[derive(Debug, thiserror::Error)]
pub enum HealthcheckError {
    #[error("healthcheck request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("healthcheck returned status {0}")]
    Unhealthy(u16),
}

/// Probe the health endpoint; succeeds only on `200 OK`.
pub async fn healthcheck(args: &HealthcheckArgs) -> Result<(), HealthcheckError> {
    let url = args.target_url();
    tracing::debug!(url = %url, "Checking gateway health");

    let client = reqwest::Client::builder().timeout(args.timeout).build()?;
    let response = client.get(&url).send().await?;
    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(HealthcheckError::Unhealthy(status.as_u16()));
    }
    tracing::info!(url = %url, "Gateway is healthy");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_args(args: &[&str]) -> ServerArgs {
        let mut argv = vec!["prommux", "server"];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Some(Command::Server(args)) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn no_subcommand_means_server_defaults() {
        let cli = Cli::try_parse_from(["prommux"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(ServerArgs::default().load_config().unwrap(), GatewayConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let args = server_args(&[
            "-p", "9000",
            "-d", "tcp://docker:2375",
            "--docker-refresh-interval", "5s",
            "-t", "2s",
            "--liveness-timeout", "500ms",
            "-i",
            "-r", "^com_",
            "-f", r#"{"label":["prommux=true"]}"#,
            "-a", r#"{"env":"prod"}"#,
            "--log-format", "text",
        ]);
        let config = args.load_config().unwrap();

        assert_eq!(config.listener.port, 9000);
        assert_eq!(config.discovery.host, "tcp://docker:2375");
        assert_eq!(config.discovery.refresh_interval, Duration::from_secs(5));
        assert_eq!(config.timeouts.proxy, Duration::from_secs(2));
        assert_eq!(config.timeouts.liveness_check, Duration::from_millis(500));
        assert!(config.labels.include_labels);
        assert_eq!(config.labels.label_regex.as_deref(), Some("^com_"));
        assert_eq!(config.discovery.filters["label"], vec!["prommux=true"]);
        assert_eq!(config.labels.additional_labels["env"], "prod");
        assert_eq!(config.observability.log_format, LogFormat::Text);
    }

    #[test]
    fn malformed_json_flag_is_config_error() {
        let args = server_args(&["-a", "not json"]);
        assert!(matches!(
            args.load_config(),
            Err(ConfigError::Json { flag: "additional-labels", .. })
        ));
    }

    #[test]
    fn invalid_regex_fails_validation() {
        let args = server_args(&["-r", "("]);
        assert!(matches!(args.load_config(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn healthcheck_url() {
        let cli = Cli::try_parse_from(["prommux", "healthcheck", "-p", "8080"]).unwrap();
        let Some(Command::Healthcheck(args)) = cli.command else {
            panic!("expected healthcheck");
        };
        assert_eq!(args.target_url(), "http://127.0.0.1:8080/-/health");
        assert_eq!(args.timeout, Duration::from_secs(30));

        let args = HealthcheckArgs {
            url: Some("http://gw:1/-/health".to_string()),
            ..args
        };
        assert_eq!(args.target_url(), "http://gw:1/-/health");
    }

    #[tokio::test]
    async fn healthcheck_fails_when_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let args = HealthcheckArgs {
            url: None,
            address: "127.0.0.1".to_string(),
            port,
            timeout: Duration::from_secs(2),
            log_level: "info".to_string(),
        };
        assert!(matches!(healthcheck(&args).await, Err(HealthcheckError::Request(_))));
    }
}
