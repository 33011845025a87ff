//! Shutdown coordination for the gateway.

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Error returned by a supervised task.
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

/// Coordinator for graceful shutdown.
///
/// Long-running tasks receive a child token from [`Shutdown::subscribe`];
/// triggering the coordinator cancels all of them at once.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled when shutdown is triggered.
    pub fn subscribe(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for two long-running tasks. The first one to exit, cleanly or
    /// not, triggers shutdown and the other one is then drained.
    ///
    /// Errors are reported in argument order.
    pub async fn supervise<A, B>(
        &self,
        mut first: JoinHandle<Result<(), A>>,
        mut second: JoinHandle<Result<(), B>>,
    ) -> Result<(), TaskError>
    where
        A: Into<TaskError>,
        B: Into<TaskError>,
    {
        let (first, second) = tokio::select! {
            result = &mut first => {
                self.trigger();
                (result, second.await)
            }
            result = &mut second => {
                self.trigger();
                (first.await, result)
            }
        };
        flatten(first)?;
        flatten(second)
    }

    /// Trigger shutdown on SIGINT or SIGTERM.
    pub fn trigger_on_signal(&self) -> JoinHandle<()> {
        let shutdown = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = wait_for_signal() => shutdown.trigger(),
                _ = shutdown.token.cancelled() => {}
            }
        })
    }
}

fn flatten<E: Into<TaskError>>(joined: Result<Result<(), E>, JoinError>) -> Result<(), TaskError> {
    joined?.map_err(Into::into)
}

/// Wait for Ctrl+C or SIGTERM.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutdown signal received");
}
