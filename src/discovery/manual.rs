//! Channel-driven discoverer, fed by hand.

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::discovery::{publish, DiscoveryError, Discoverer};
use crate::targets::TargetGroup;

enum Command {
    Publish(Vec<TargetGroup>),
    Fail(String),
}

/// Create a connected handle and discoverer.
pub fn channel() -> (ManualHandle, ManualDiscoverer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ManualHandle { tx },
        ManualDiscoverer {
            rx: Mutex::new(Some(rx)),
        },
    )
}

/// Publishing side of a manual feed. Dropping every handle ends the feed.
#[derive(Clone)]
pub struct ManualHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl ManualHandle {
    /// Queue a complete snapshot. Returns false once the feed is gone.
    pub fn publish(&self, groups: Vec<TargetGroup>) -> bool {
        self.tx.send(Command::Publish(groups)).is_ok()
    }

    /// Terminate the feed with an error once queued snapshots are delivered.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.tx.send(Command::Fail(message.into())).is_ok()
    }
}

/// Discoverer replaying what its [`ManualHandle`] publishes.
pub struct ManualDiscoverer {
    rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
}

#[async_trait]
impl Discoverer for ManualDiscoverer {
    async fn run(
        &self,
        cancel: CancellationToken,
        tx: mpsc::Sender<Vec<TargetGroup>>,
    ) -> Result<(), DiscoveryError> {
        let mut rx = self.rx.lock().await.take().ok_or(DiscoveryError::AlreadyRunning)?;

        loop {
            let command = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                command = rx.recv() => command,
            };

            match command {
                Some(Command::Publish(groups)) => {
                    if !publish(&cancel, &tx, groups).await {
                        return Ok(());
                    }
                }
                Some(Command::Fail(message)) => return Err(DiscoveryError::Feed(message)),
                None => return Ok(()),
            }
        }
    }
}
