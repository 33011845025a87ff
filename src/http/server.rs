//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, access log)
//! - Bind server to listener and drain on shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::gateway::Gateway;
use crate::http::{handlers, middleware::access_log};

/// Route template of the proxy endpoint.
pub const PROXY_ROUTE: &str = "/proxy/{route_id}";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    /// Advertised on `/discover` when the request carries no host.
    pub bind_address: String,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server serving `gateway`.
    pub fn new(gateway: Arc<Gateway>) -> Self {
        let bind_address = gateway.config().listener.socket_address();
        let state = AppState {
            gateway,
            bind_address,
        };
        Self {
            router: Self::build_router(state),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/discover", get(handlers::discover))
            .route(PROXY_ROUTE, any(handlers::proxy))
            .route("/status", get(handlers::status))
            .route("/-/health", get(handlers::health))
            .route("/metrics", get(handlers::metrics))
            .route_layer(middleware::from_fn_with_state(state.clone(), access_log))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: CancellationToken) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
