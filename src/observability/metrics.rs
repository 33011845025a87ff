//! Metrics collection and exposition.
//!
//! # Metrics
//! - `prommux_proxied_endpoints_count` (gauge): routes in the current snapshot
//! - `prommux_discovery_last_success_timestamp_seconds` (gauge): unix time of
//!   the last applied discovery cycle
//! - `prommux_proxy_success_count` (counter): proxied scrapes answered with 200
//! - `prommux_proxy_failure_count` (counter): every other proxied scrape
//! - `prommux_http_requests_total` (counter): requests by code, handler,
//!   method and path
//!
//! # Design Decisions
//! - Metrics are written to an injected [`MetricsSink`], never to a global
//!   recorder, so several gateways (and tests) can live in one process
//! - Only an exact 200 counts as a proxy success

use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use metrics::Label;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

pub const PROXIED_ENDPOINTS: &str = "prommux_proxied_endpoints_count";
pub const DISCOVERY_LAST_SUCCESS: &str = "prommux_discovery_last_success_timestamp_seconds";
pub const PROXY_SUCCESS: &str = "prommux_proxy_success_count";
pub const PROXY_FAILURE: &str = "prommux_proxy_failure_count";
pub const HTTP_REQUESTS: &str = "prommux_http_requests_total";

/// Destination of the gateway's counters and gauges.
pub trait MetricsSink: Send + Sync + 'static {
    fn increment_counter(&self, name: &'static str, labels: &[(&'static str, String)]);

    fn set_gauge(&self, name: &'static str, value: f64);

    /// Text exposition of everything recorded so far, if the sink keeps it.
    fn render(&self) -> Option<String> {
        None
    }
}

/// Sink backed by a private Prometheus recorder.
pub struct PrometheusSink {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl PrometheusSink {
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            metrics::describe_gauge!(PROXIED_ENDPOINTS, "Number of proxied exporter endpoints");
            metrics::describe_gauge!(
                DISCOVERY_LAST_SUCCESS,
                "Unix timestamp of the last successfully applied discovery cycle"
            );
            metrics::describe_counter!(PROXY_SUCCESS, "Count of succeeded requests of proxy endpoint");
            metrics::describe_counter!(PROXY_FAILURE, "Count of failed requests of proxy endpoint");
            metrics::describe_counter!(HTTP_REQUESTS, "Counter of requests made to the HTTP endpoints");

            metrics::counter!(PROXY_SUCCESS).absolute(0);
            metrics::counter!(PROXY_FAILURE).absolute(0);
            metrics::gauge!(PROXIED_ENDPOINTS).set(0.0);
        });

        Self { recorder, handle }
    }
}

impl Default for PrometheusSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for PrometheusSink {
    fn increment_counter(&self, name: &'static str, labels: &[(&'static str, String)]) {
        let labels: Vec<Label> = labels.iter().map(|(k, v)| Label::new(*k, v.clone())).collect();
        metrics::with_local_recorder(&self.recorder, || {
            metrics::counter!(name, labels).increment(1);
        });
    }

    fn set_gauge(&self, name: &'static str, value: f64) {
        metrics::with_local_recorder(&self.recorder, || {
            metrics::gauge!(name).set(value);
        });
    }

    fn render(&self) -> Option<String> {
        Some(self.handle.render())
    }
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn increment_counter(&self, _name: &'static str, _labels: &[(&'static str, String)]) {}

    fn set_gauge(&self, _name: &'static str, _value: f64) {}
}

/// In-memory sink for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    counters: DashMap<String, u64>,
    gauges: DashMap<&'static str, f64>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of the counter with exactly these labels.
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = series_key(name, labels.iter().map(|(k, v)| (*k, *v)));
        self.counters.get(&key).map(|v| *v).unwrap_or(0)
    }

    /// Sum of the counter across all label combinations.
    pub fn counter_total(&self, name: &str) -> u64 {
        self.counters
            .iter()
            .filter(|entry| entry.key() == name || entry.key().starts_with(&format!("{name}{{")))
            .map(|entry| *entry.value())
            .sum()
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.gauges.get(name).map(|v| *v)
    }
}

impl MetricsSink for RecordingSink {
    fn increment_counter(&self, name: &'static str, labels: &[(&'static str, String)]) {
        let key = series_key(name, labels.iter().map(|(k, v)| (*k, v.as_str())));
        *self.counters.entry(key).or_insert(0) += 1;
    }

    fn set_gauge(&self, name: &'static str, value: f64) {
        self.gauges.insert(name, value);
    }

    fn render(&self) -> Option<String> {
        let mut lines: Vec<String> = self
            .counters
            .iter()
            .map(|entry| format!("{} {}", entry.key(), entry.value()))
            .chain(self.gauges.iter().map(|entry| format!("{} {}", entry.key(), entry.value())))
            .collect();
        lines.sort();
        Some(lines.join("\n") + "\n")
    }
}

fn series_key<'a>(name: &str, labels: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    let labels: Vec<String> = labels.map(|(k, v)| format!("{k}=\"{v}\"")).collect();
    if labels.is_empty() {
        name.to_string()
    } else {
        format!("{name}{{{}}}", labels.join(","))
    }
}

/// Record the outcome of a proxied scrape.
pub fn record_proxy_result(sink: &dyn MetricsSink, status: u16) {
    if status == 200 {
        sink.increment_counter(PROXY_SUCCESS, &[]);
    } else {
        sink.increment_counter(PROXY_FAILURE, &[]);
    }
}

/// Record a served HTTP request.
pub fn record_http_request(sink: &dyn MetricsSink, status: u16, handler: &str, method: &str, path: &str) {
    sink.increment_counter(
        HTTP_REQUESTS,
        &[
            ("code", status.to_string()),
            ("handler", handler.to_string()),
            ("method", method.to_string()),
            ("path", path.to_string()),
        ],
    );
}

/// Record an applied discovery cycle.
pub fn record_discovery_success(sink: &dyn MetricsSink, endpoints: usize) {
    sink.set_gauge(PROXIED_ENDPOINTS, endpoints as f64);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    sink.set_gauge(DISCOVERY_LAST_SUCCESS, now.floor());
}
