//! Docker Engine discoverer.
//!
//! # Responsibilities
//! - Poll the running containers every refresh interval
//! - Emit one target per (container, network, exposed port)
//! - Attach `__meta_docker_*` labels and copy `prommux.*` container labels
//!
//! # Design Decisions
//! - A failed refresh is logged and retried on the next tick
//! - Only TCP ports become targets; containers without one are scraped on
//!   the configured port
//! - Containers in host network mode are reached through
//!   `host_networking_host`

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::{ContainerSummary, Port, PortTypeEnum};
use bollard::Docker;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::DiscoveryConfig;
use crate::discovery::{publish, DiscoveryError, Discoverer};
use crate::targets::labels::{sanitize_label_name, LabelSet, ADDRESS_LABEL, OVERRIDE_LABEL_PREFIX};
use crate::targets::TargetGroup;

const META_PREFIX: &str = "__meta_docker_";
const SOURCE: &str = "docker";

/// Discoverer listing containers through the Docker Engine API.
pub struct DockerDiscoverer {
    config: DiscoveryConfig,
}

impl DockerDiscoverer {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    fn connect(&self) -> Result<Docker, DiscoveryError> {
        let host = self.config.host.as_str();
        let timeout = self.config.timeout.as_secs().max(1);

        let docker = if let Some(path) = host.strip_prefix("unix://") {
            Docker::connect_with_socket(path, timeout, bollard::API_DEFAULT_VERSION)
        } else if host.starts_with("tcp://") || host.starts_with("http://") {
            Docker::connect_with_http(host, timeout, bollard::API_DEFAULT_VERSION)
        } else {
            return Err(DiscoveryError::UnsupportedHost(host.to_string()));
        };

        docker.map_err(|source| DiscoveryError::Connect {
            host: host.to_string(),
            source,
        })
    }

    async fn refresh(&self, docker: &Docker) -> Result<Vec<TargetGroup>, bollard::errors::Error> {
        let filters: HashMap<String, Vec<String>> = self
            .config
            .filters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let containers = docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: false,
                filters,
                ..Default::default()
            }))
            .await?;

        let targets = containers
            .iter()
            .flat_map(|container| container_targets(container, &self.config))
            .collect();

        Ok(vec![TargetGroup {
            targets,
            labels: LabelSet::new(),
            source: SOURCE.to_string(),
        }])
    }
}

#[async_trait]
impl Discoverer for DockerDiscoverer {
    async fn run(
        &self,
        cancel: CancellationToken,
        tx: mpsc::Sender<Vec<TargetGroup>>,
    ) -> Result<(), DiscoveryError> {
        let docker = self.connect()?;
        tracing::info!(
            host = %self.config.host,
            refresh_interval = ?self.config.refresh_interval,
            "Docker discovery starting"
        );

        let mut ticker = time::interval(self.config.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match time::timeout(self.config.timeout, self.refresh(&docker)).await {
                Ok(Ok(groups)) => {
                    let count: usize = groups.iter().map(|g| g.targets.len()).sum();
                    tracing::debug!(targets = count, "Docker discovery refreshed");
                    if !publish(&cancel, &tx, groups).await {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Docker discovery refresh failed");
                }
                Err(_) => {
                    tracing::warn!(timeout = ?self.config.timeout, "Docker discovery refresh timed out");
                }
            }
        }

        tracing::info!("Docker discovery stopped");
        Ok(())
    }
}

/// Build the targets of one container.
fn container_targets(container: &ContainerSummary, config: &DiscoveryConfig) -> Vec<LabelSet> {
    let mut common = LabelSet::new();
    if let Some(id) = &container.id {
        common.insert(meta("container_id"), id.clone());
    }
    if let Some(name) = container.names.as_ref().and_then(|names| names.first()) {
        common.insert(meta("container_name"), name.clone());
    }

    let network_mode = container
        .host_config
        .as_ref()
        .and_then(|hc| hc.network_mode.clone())
        .unwrap_or_default();
    common.insert(meta("container_network_mode"), network_mode.clone());

    if let Some(labels) = &container.labels {
        for (key, value) in labels {
            common.insert(
                meta(&format!("container_label_{}", sanitize_label_name(key))),
                value.clone(),
            );
            if key.starts_with(OVERRIDE_LABEL_PREFIX) {
                common.insert(key.clone(), value.clone());
            }
        }
    }

    let host_mode = network_mode == "host";
    let ports: Vec<&Port> = container
        .ports
        .iter()
        .flatten()
        .filter(|port| port.typ == Some(PortTypeEnum::TCP))
        .collect();
    let networks = container
        .network_settings
        .as_ref()
        .and_then(|ns| ns.networks.as_ref());

    let mut targets = Vec::new();
    for (network_name, network) in networks.into_iter().flatten() {
        let ip = network.ip_address.clone().unwrap_or_default();
        let host = if host_mode {
            config.host_networking_host.as_str()
        } else {
            ip.as_str()
        };

        let mut base = common.clone();
        base.insert(meta("network_name"), network_name.clone());
        base.insert(meta("network_ip"), ip.clone());
        if let Some(id) = &network.network_id {
            base.insert(meta("network_id"), id.clone());
        }

        if ports.is_empty() {
            let mut target = base;
            target.insert(ADDRESS_LABEL.to_string(), join_host_port(host, config.port));
            targets.push(target);
            continue;
        }

        for port in &ports {
            let mut target = base.clone();
            target.insert(meta("port_private"), port.private_port.to_string());
            if let Some(public) = port.public_port.filter(|p| *p > 0) {
                target.insert(meta("port_public"), public.to_string());
            }
            if let Some(public_ip) = port.ip.as_ref().filter(|ip| !ip.is_empty()) {
                target.insert(meta("port_public_ip"), public_ip.clone());
            }
            target.insert(ADDRESS_LABEL.to_string(), join_host_port(host, port.private_port));
            targets.push(target);
        }
    }
    targets
}

fn meta(name: &str) -> String {
    format!("{META_PREFIX}{name}")
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
