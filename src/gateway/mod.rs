//! The gateway: discovery consumer loop and shared request-side state.
//!
//! # Data Flow
//! ```text
//! Discoverer (spawned task)
//!     → mpsc (capacity 1)
//!     → consumer loop (Gateway::run)
//!         → lock TargetStore writer
//!         → resolve every target (any error aborts the batch)
//!         → liveness probes (optional)
//!         → dedup by RouteId, replace snapshot
//!         → ready = true, gauges updated
//!
//! HTTP handlers (concurrent):
//!     → Gateway::service_discovery / status / route / proxies
//! ```
//!
//! # Design Decisions
//! - Readers never wait on the writer lock; they load the current snapshot
//! - A batch is applied completely or not at all
//! - Losing the discovery feed is fatal and flips readiness off

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{compile_label_regex, GatewayConfig, ValidationError};
use crate::discovery::{DiscoveryError, Discoverer};
use crate::health::LivenessChecker;
use crate::lifecycle::ReadinessSignal;
use crate::observability::metrics::{record_discovery_success, MetricsSink};
use crate::proxy::{Forwarder, ProxyCache, ProxyError};
use crate::targets::labels::{strip_reserved, DETECTED_URL_LABEL, METRICS_PATH_LABEL, SCHEME_LABEL};
use crate::targets::{
    resolve, LabelFilter, LabelSet, ResolutionError, Route, RouteId, TargetGroup, TargetSnapshot,
    TargetStore,
};

/// Error terminating or preventing the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ValidationError),

    #[error("failed to build upstream client: {0}")]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("discovery feed ended unexpectedly")]
    FeedExhausted,

    #[error("discovery task panicked: {0}")]
    FeedPanicked(String),
}

/// One entry of the HTTP service discovery response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticConfig {
    pub targets: Vec<String>,
    #[serde(default)]
    pub labels: LabelSet,
}

/// One proxied endpoint in the status report.
#[derive(Debug, Clone, Serialize)]
pub struct StatusTarget {
    pub url: String,
    pub hash: RouteId,
}

/// Body of `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusReport<'a> {
    pub targets: Vec<StatusTarget>,
    pub config: &'a GatewayConfig,
}

/// Discovery-driven reverse proxy state.
pub struct Gateway {
    config: GatewayConfig,
    discoverer: Arc<dyn Discoverer>,
    store: TargetStore,
    filter: LabelFilter,
    proxies: ProxyCache,
    liveness: Option<LivenessChecker>,
    readiness: ReadinessSignal,
    metrics: Arc<dyn MetricsSink>,
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        discoverer: Arc<dyn Discoverer>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, GatewayError> {
        let filter = LabelFilter::new(compile_label_regex(&config.labels)?);
        let proxies = ProxyCache::new(Forwarder::new(config.timeouts.proxy)?);
        let liveness = if config.timeouts.liveness_enabled() {
            Some(LivenessChecker::new(config.timeouts.liveness_check)?)
        } else {
            None
        };

        Ok(Self {
            config,
            discoverer,
            store: TargetStore::new(),
            filter,
            proxies,
            liveness,
            readiness: ReadinessSignal::new(),
            metrics,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn readiness(&self) -> &ReadinessSignal {
        &self.readiness
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.load()
    }

    pub fn metrics(&self) -> &dyn MetricsSink {
        self.metrics.as_ref()
    }

    pub fn proxies(&self) -> &ProxyCache {
        &self.proxies
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<TargetSnapshot> {
        self.store.load()
    }

    /// Route currently registered under `id`.
    pub fn route(&self, id: &str) -> Option<Route> {
        self.store.load().get(id).cloned()
    }

    /// Consume the discovery feed until cancelled or the feed terminates.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), GatewayError> {
        let (tx, mut rx) = mpsc::channel(1);
        let feed_cancel = cancel.child_token();
        let feed = {
            let discoverer = Arc::clone(&self.discoverer);
            let token = feed_cancel.clone();
            tokio::spawn(async move { discoverer.run(token, tx).await })
        };

        tracing::info!("Discovery consumer loop started");
        loop {
            let batch = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                batch = rx.recv() => batch,
            };

            let Some(groups) = batch else {
                break;
            };
            match self.apply(groups).await {
                Ok(count) => tracing::info!(endpoints = count, "Applied discovery snapshot"),
                Err(e) => tracing::warn!(error = %e, "Discarded discovery snapshot"),
            }
        }

        self.readiness.store(false);

        if cancel.is_cancelled() {
            feed_cancel.cancel();
            if let Err(e) = feed.await {
                tracing::warn!(error = %e, "Discovery task did not stop cleanly");
            }
            tracing::info!("Discovery consumer loop stopped");
            return Ok(());
        }

        let result = match feed.await {
            Ok(Ok(())) => Err(GatewayError::FeedExhausted),
            Ok(Err(e)) => Err(GatewayError::Discovery(e)),
            Err(e) => Err(GatewayError::FeedPanicked(e.to_string())),
        };
        if let Err(e) = &result {
            tracing::error!(error = %e, "Discovery feed terminated");
        }
        result
    }

    /// Resolve, probe and publish one batch. Returns the number of routes.
    async fn apply(&self, groups: Vec<TargetGroup>) -> Result<usize, ResolutionError> {
        let writer = self.store.lock().await;

        let mut routes = Vec::new();
        for group in &groups {
            for labels in group.merged_targets() {
                let endpoint = resolve(&labels)?;
                routes.push(Route::new(endpoint, labels));
            }
        }

        if let Some(checker) = &self.liveness {
            routes = checker.admit(routes).await;
        }

        let snapshot = TargetSnapshot::from_routes(routes);
        for route in snapshot.iter() {
            tracing::debug!(url = %route.endpoint, route_id = %route.id, "Registered endpoint");
        }
        let count = snapshot.len();
        writer.replace(snapshot);
        drop(writer);

        record_discovery_success(self.metrics.as_ref(), count);
        self.readiness.store(true);
        Ok(count)
    }

    /// HTTP service discovery entries pointing back at this gateway.
    pub fn service_discovery(&self, address: &str, scheme: &str) -> Vec<StaticConfig> {
        let snapshot = self.store.load();
        snapshot
            .iter()
            .map(|route| {
                let mut labels = LabelSet::new();
                labels.insert(SCHEME_LABEL.to_string(), scheme.to_string());
                labels.insert(METRICS_PATH_LABEL.to_string(), format!("/proxy/{}", route.id));

                if self.config.labels.include_labels {
                    labels.extend(self.filter.filter(&strip_reserved(&route.labels)));
                }
                labels.extend(
                    self.config
                        .labels
                        .additional_labels
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone())),
                );
                labels.insert(DETECTED_URL_LABEL.to_string(), route.endpoint.url());

                StaticConfig {
                    targets: vec![address.to_string()],
                    labels,
                }
            })
            .collect()
    }

    /// Proxied endpoints and the effective configuration.
    pub fn status(&self) -> StatusReport<'_> {
        let targets = self
            .store
            .load()
            .iter()
            .map(|route| StatusTarget {
                url: route.endpoint.url(),
                hash: route.id.clone(),
            })
            .collect();

        StatusReport {
            targets,
            config: &self.config,
        }
    }
}
