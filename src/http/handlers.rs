//! Endpoint handlers.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};

use crate::gateway::StaticConfig;
use crate::http::server::AppState;
use crate::observability::metrics::record_proxy_result;
use crate::targets::labels::DEFAULT_SCHEME;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// `GET /discover`: Prometheus HTTP service discovery document.
///
/// The advertised address is taken from `X-Forwarded-Host`, then `Host`, then
/// the request authority (HTTP/2 carries no `Host`), then the bind address.
pub async fn discover(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Json<Vec<StaticConfig>> {
    let address = first_value(&headers, "x-forwarded-host")
        .or_else(|| first_value(&headers, header::HOST.as_str()))
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or(state.bind_address.as_str())
        .to_string();
    let scheme = first_value(&headers, "x-forwarded-proto").unwrap_or(DEFAULT_SCHEME);

    Json(state.gateway.service_discovery(&address, scheme))
}

/// `ANY /proxy/{route_id}`: forward to the endpoint registered under the id.
pub async fn proxy(
    State(state): State<AppState>,
    Path(route_id): Path<String>,
    request: Request<Body>,
) -> Response {
    let Some(route) = state.gateway.route(&route_id) else {
        tracing::debug!(route_id = %route_id, "Unknown route");
        return (StatusCode::NOT_FOUND, "missing source").into_response();
    };

    let handler = match state.gateway.proxies().get_or_create(&route.endpoint) {
        Ok(handler) => handler,
        Err(e) => {
            tracing::warn!(route_id = %route_id, url = %route.endpoint, error = %e, "Cannot proxy endpoint");
            record_proxy_result(state.gateway.metrics(), StatusCode::BAD_GATEWAY.as_u16());
            return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
        }
    };

    tracing::debug!(route_id = %route_id, url = %handler.url(), "Proxying request");
    let response = handler.forward(request).await;
    record_proxy_result(state.gateway.metrics(), response.status().as_u16());
    response
}

/// `GET /status`: proxied endpoints and effective configuration.
pub async fn status(State(state): State<AppState>) -> Response {
    Json(state.gateway.status()).into_response()
}

/// `GET /-/health`: 200 once the first discovery cycle was applied.
pub async fn health(State(state): State<AppState>) -> Response {
    if state.gateway.is_ready() {
        StatusCode::OK.into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "healthcheck failed: gateway is not ready",
        )
            .into_response()
    }
}

/// `GET /metrics`: text exposition of the gateway's metrics.
pub async fn metrics(State(state): State<AppState>) -> Response {
    let body = state.gateway.metrics().render().unwrap_or_default();
    ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response()
}

fn first_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
