//! prommux: HTTP service discovery and reverse proxy for Prometheus exporters.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                       PROMMUX                         │
//!                 │                                                       │
//!  Docker API ────┼─▶ discovery ──▶ gateway consumer loop ──▶ targets     │
//!                 │                   (resolve, probe, dedup)   store     │
//!                 │                                              │        │
//!  Prometheus ────┼─▶ http ──▶ /discover, /status ◀──────────────┤        │
//!                 │        ──▶ /proxy/{route_id} ──▶ proxy cache ─┼───────┼──▶ Exporter
//!                 │        ──▶ /-/health ◀── lifecycle readiness  │       │
//!                 │        ──▶ /metrics  ◀── observability        │       │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use prommux::cli::{healthcheck, Cli, Command, HealthcheckArgs, ServerArgs};
use prommux::discovery::DockerDiscoverer;
use prommux::gateway::Gateway;
use prommux::http::HttpServer;
use prommux::lifecycle::Shutdown;
use prommux::observability::{logging, LogFormat, MetricsSink, PrometheusSink};

type BoxError = Box<dyn Error + Send + Sync>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Command::Healthcheck(args)) => run_healthcheck(args).await,
        Some(Command::Server(args)) => run_server(args).await,
        None => run_server(ServerArgs::default()).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // No-op when a subscriber is already installed.
            let _ = logging::init("error", LogFormat::Json);
            tracing::error!(error = %error_chain(e.as_ref()), "prommux failed");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(args: ServerArgs) -> Result<(), BoxError> {
    let config = args.load_config()?;
    logging::init(&config.observability.log_level, config.observability.log_format)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "prommux starting");
    tracing::info!(
        bind_address = %config.listener.socket_address(),
        docker_host = %config.discovery.host,
        refresh_interval = ?config.discovery.refresh_interval,
        liveness_check = ?config.timeouts.liveness_check,
        "Configuration loaded"
    );

    let metrics: Arc<dyn MetricsSink> = Arc::new(PrometheusSink::new());
    let discoverer = Arc::new(DockerDiscoverer::new(config.discovery.clone()));
    let gateway = Arc::new(Gateway::new(config, discoverer, metrics)?);

    let listener = TcpListener::bind(gateway.config().listener.socket_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let consumer = {
        let gateway = Arc::clone(&gateway);
        let token = shutdown.subscribe();
        tokio::spawn(async move { gateway.run(token).await })
    };
    let server = tokio::spawn(HttpServer::new(gateway).run(listener, shutdown.subscribe()));

    shutdown.supervise(consumer, server).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn run_healthcheck(args: HealthcheckArgs) -> Result<(), BoxError> {
    logging::init(&args.log_level, LogFormat::Json)?;
    healthcheck(&args).await?;
    Ok(())
}

fn error_chain(error: &(dyn Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
