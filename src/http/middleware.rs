//! Access logging and per-route request counters.

use std::time::Instant;

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{header, Request},
    middleware::Next,
    response::Response,
};

use crate::http::server::{AppState, PROXY_ROUTE};
use crate::observability::metrics::record_http_request;

/// Header carrying the request id set by the outer request-id layer.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Log every request and count it by code, handler, method and path.
pub async fn access_log(State(state): State<AppState>, request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let handler = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| path.clone());
    let request_id = header_str(&request, X_REQUEST_ID).unwrap_or("unknown").to_string();
    let user_agent = header_str(&request, header::USER_AGENT.as_str())
        .unwrap_or_default()
        .to_string();

    let response = next.run(request).await;
    let status = response.status();

    record_http_request(
        state.gateway.metrics(),
        status.as_u16(),
        &handler,
        method.as_str(),
        path_label(&state, &handler, &path),
    );

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        handler = %handler,
        status = status.as_u16(),
        user_agent = %user_agent,
        latency_ms = start.elapsed().as_millis() as u64,
        "Request completed"
    );

    response
}

/// Path recorded on the request counter. Proxy paths naming an id that is
/// not in the current snapshot collapse to the route template, so arbitrary
/// ids cannot create new series.
fn path_label<'a>(state: &AppState, handler: &'a str, path: &'a str) -> &'a str {
    if handler != PROXY_ROUTE {
        return path;
    }
    let known = path
        .strip_prefix("/proxy/")
        .is_some_and(|id| state.gateway.snapshot().get(id).is_some());
    if known {
        path
    } else {
        handler
    }
}

fn header_str<'a>(request: &'a Request<Body>, name: &str) -> Option<&'a str> {
    request.headers().get(name).and_then(|v| v.to_str().ok())
}
