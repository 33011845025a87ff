//! Liveness probing of discovered endpoints.
//!
//! # Responsibilities
//! - Scrape each resolved endpoint once, the way Prometheus would
//! - Admit only endpoints answering `200 OK` within the timeout
//!
//! # Design Decisions
//! - Probes go through the same forwarding path as real scrapes
//! - The whole probe (connect, head and body) is bounded by one timeout
//! - Probes of one batch run concurrently

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use futures_util::future::join_all;
use http_body_util::BodyExt;
use tokio::time;

use crate::proxy::{Forwarder, ProxyError};
use crate::targets::{ResolvedEndpoint, Route};

const USER_AGENT: &str = concat!("prommux/", env!("CARGO_PKG_VERSION"));
const ACCEPT: &str =
    "application/openmetrics-text;version=1.0.0,text/plain;version=0.0.4;q=0.5,*/*;q=0.1";

/// Result of probing one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Alive,
    Status(StatusCode),
    Failed(String),
    TimedOut,
}

impl ProbeOutcome {
    pub fn is_alive(&self) -> bool {
        matches!(self, ProbeOutcome::Alive)
    }
}

/// Probes endpoints before they are admitted into a snapshot.
pub struct LivenessChecker {
    forwarder: Forwarder,
    timeout: Duration,
}

impl LivenessChecker {
    pub fn new(timeout: Duration) -> Result<Self, ProxyError> {
        Ok(Self {
            forwarder: Forwarder::new(timeout)?,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe `endpoint`, discarding the body.
    pub async fn probe(&self, endpoint: &ResolvedEndpoint) -> ProbeOutcome {
        match time::timeout(self.timeout, self.scrape(endpoint)).await {
            Ok(Ok(StatusCode::OK)) => ProbeOutcome::Alive,
            Ok(Ok(status)) => ProbeOutcome::Status(status),
            Ok(Err(e)) => ProbeOutcome::Failed(e.to_string()),
            Err(_) => ProbeOutcome::TimedOut,
        }
    }

    async fn scrape(&self, endpoint: &ResolvedEndpoint) -> Result<StatusCode, ProxyError> {
        let handler = self.forwarder.handler(endpoint)?;
        let request = Request::builder()
            .method("GET")
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, ACCEPT)
            .header(header::ACCEPT_ENCODING, "gzip")
            .body(Body::empty())?;

        let response = handler.try_forward(request).await?;
        let status = response.status();

        let mut body = response.into_body();
        while let Some(frame) = body.frame().await {
            if let Err(e) = frame {
                tracing::debug!(url = %handler.url(), error = %e, "Liveness probe body aborted");
                break;
            }
        }
        Ok(status)
    }

    /// Probe every route concurrently and keep the live ones, in order.
    pub async fn admit(&self, routes: Vec<Route>) -> Vec<Route> {
        let outcomes = join_all(routes.iter().map(|route| self.probe(&route.endpoint))).await;

        routes
            .into_iter()
            .zip(outcomes)
            .filter_map(|(route, outcome)| {
                if outcome.is_alive() {
                    return Some(route);
                }
                tracing::warn!(
                    url = %route.endpoint,
                    route_id = %route.id,
                    outcome = ?outcome,
                    "Endpoint liveness check failed"
                );
                None
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn endpoint(addr: SocketAddr, path: &str) -> ResolvedEndpoint {
        ResolvedEndpoint {
            scheme: "http".to_string(),
            host: addr.to_string(),
            path: path.to_string(),
        }
    }

    #[tokio::test]
    async fn classifies_responses() {
        let addr = serve(
            Router::new()
                .route("/metrics", get(|| async { "up 1\n" }))
                .route("/empty", get(|| async { StatusCode::NO_CONTENT }))
                .route(
                    "/slow",
                    get(|| async {
                        time::sleep(Duration::from_secs(5)).await;
                        "late"
                    }),
                ),
        )
        .await;

        let checker = LivenessChecker::new(Duration::from_millis(300)).unwrap();
        assert_eq!(checker.probe(&endpoint(addr, "/metrics")).await, ProbeOutcome::Alive);
        assert_eq!(
            checker.probe(&endpoint(addr, "/empty")).await,
            ProbeOutcome::Status(StatusCode::NO_CONTENT)
        );
        assert_eq!(
            checker.probe(&endpoint(addr, "/missing")).await,
            ProbeOutcome::Status(StatusCode::NOT_FOUND)
        );
        assert_eq!(checker.probe(&endpoint(addr, "/slow")).await, ProbeOutcome::TimedOut);
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let checker = LivenessChecker::new(Duration::from_millis(500)).unwrap();
        let outcome = checker.probe(&endpoint(addr, "/metrics")).await;
        assert!(matches!(outcome, ProbeOutcome::Failed(_) | ProbeOutcome::TimedOut));
    }

    #[tokio::test]
    async fn admit_keeps_live_routes_in_order() {
        let addr = serve(
            Router::new()
                .route("/a", get(|| async { "a" }))
                .route("/c", get(|| async { "c" })),
        )
        .await;

        let routes = ["/a", "/b", "/c"]
            .into_iter()
            .map(|path| Route::new(endpoint(addr, path), Default::default()))
            .collect();

        let checker = LivenessChecker::new(Duration::from_secs(1)).unwrap();
        let admitted: Vec<String> = checker
            .admit(routes)
            .await
            .into_iter()
            .map(|route| route.endpoint.path)
            .collect();
        assert_eq!(admitted, vec!["/a", "/c"]);
    }
}
