//! Discovery subsystem.
//!
//! # Data Flow
//! ```text
//! docker.rs (Docker Engine API, polled every refresh_interval)
//! manual.rs (batches pushed through a handle)
//!     → Discoverer::run
//!     → mpsc::Sender<Vec<TargetGroup>> (complete snapshots)
//!     → gateway consumer loop
//! ```
//!
//! # Design Decisions
//! - Every message is a complete snapshot, never a delta
//! - A discoverer returns `Ok(())` on cancellation and `Err` only when the
//!   feed cannot continue

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::targets::TargetGroup;

pub mod docker;
pub mod manual;

pub use docker::DockerDiscoverer;
pub use manual::{ManualDiscoverer, ManualHandle};

/// Error terminating a discovery feed.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("unsupported docker host '{0}', expected unix://, tcp:// or http://")]
    UnsupportedHost(String),

    #[error("failed to connect to docker at {host}: {source}")]
    Connect {
        host: String,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("discovery feed is already running")]
    AlreadyRunning,

    #[error("discovery feed failed: {0}")]
    Feed(String),
}

/// Source of target groups.
#[async_trait]
pub trait Discoverer: Send + Sync {
    /// Stream complete target snapshots into `tx` until `cancel` fires or the
    /// feed fails.
    async fn run(
        &self,
        cancel: CancellationToken,
        tx: mpsc::Sender<Vec<TargetGroup>>,
    ) -> Result<(), DiscoveryError>;
}

/// Send `groups`, giving up when cancelled. Returns false when the feed
/// should stop.
pub(crate) async fn publish(
    cancel: &CancellationToken,
    tx: &mpsc::Sender<Vec<TargetGroup>>,
    groups: Vec<TargetGroup>,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = tx.send(groups) => sent.is_ok(),
    }
}
