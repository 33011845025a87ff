//! Request forwarding to a single upstream endpoint.
//!
//! # Responsibilities
//! - Rewrite the request URI to the endpoint URL
//! - Strip hop-by-hop headers in both directions
//! - Append the client address to `X-Forwarded-For`
//! - Stream the upstream response back verbatim
//!
//! # Design Decisions
//! - Only the connect phase is bounded by a timeout; a slow upstream body is
//!   streamed for as long as it takes
//! - Transport errors become `502 Bad Gateway`, never a panic

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, Uri},
    response::IntoResponse,
};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::targets::ResolvedEndpoint;

/// HTTP(S) client shared by every handler built from one [`Forwarder`].
pub type UpstreamClient = Client<HttpsConnector<HttpConnector>, Body>;

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that only apply to a single connection.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Error raised while building or using a forwarding handler.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("failed to set up TLS: {0}")]
    Tls(#[from] rustls::Error),

    #[error("invalid upstream url '{url}': {source}")]
    InvalidTarget {
        url: String,
        #[source]
        source: axum::http::uri::InvalidUri,
    },

    #[error("unsupported upstream scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("failed to build upstream request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
}

/// Factory of forwarding handlers sharing one connection pool.
#[derive(Clone)]
pub struct Forwarder {
    client: UpstreamClient,
}

impl Forwarder {
    /// Build a forwarder whose connections time out after `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Result<Self, ProxyError> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(connect_timeout));

        let https = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())?
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new()).build(https);
        Ok(Self { client })
    }

    /// Build a handler forwarding to `endpoint`.
    pub fn handler(&self, endpoint: &ResolvedEndpoint) -> Result<ProxyHandler, ProxyError> {
        ProxyHandler::new(endpoint, self.client.clone())
    }
}

/// Forwards requests to one upstream URL.
pub struct ProxyHandler {
    url: String,
    target: Uri,
    client: UpstreamClient,
}

impl ProxyHandler {
    fn new(endpoint: &ResolvedEndpoint, client: UpstreamClient) -> Result<Self, ProxyError> {
        let url = endpoint.url();
        let target: Uri = url.parse().map_err(|source| ProxyError::InvalidTarget {
            url: url.clone(),
            source,
        })?;

        match target.scheme_str() {
            Some(scheme) if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") => {}
            other => return Err(ProxyError::UnsupportedScheme(other.unwrap_or_default().to_string())),
        }

        Ok(Self { url, target, client })
    }

    /// Upstream URL this handler forwards to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Forward `request`, turning transport failures into `502 Bad Gateway`.
    pub async fn forward(&self, request: Request<Body>) -> Response<Body> {
        match self.try_forward(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "Upstream request failed");
                (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
            }
        }
    }

    /// Forward `request` and return the upstream response head with its
    /// streaming body.
    pub async fn try_forward(&self, request: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let client_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        let (parts, body) = request.into_parts();

        let mut builder = Request::builder()
            .method(parts.method)
            .uri(self.target.clone())
            .version(axum::http::Version::HTTP_11);

        if let Some(headers) = builder.headers_mut() {
            *headers = parts.headers;
            strip_hop_by_hop(headers);
            headers.remove(header::HOST);
            if let Some(ip) = client_addr {
                append_forwarded_for(headers, &ip.to_string());
            }
        }

        let upstream = builder.body(body)?;
        let response = self.client.request(upstream).await?;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

/// Remove hop-by-hop headers, including those named by `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Append `client` to any `X-Forwarded-For` chain already present.
fn append_forwarded_for(headers: &mut HeaderMap, client: &str) {
    let prior: Vec<&str> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    let value = if prior.is_empty() {
        client.to_string()
    } else {
        format!("{}, {client}", prior.join(", "))
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR.clone(), value);
    }
}
