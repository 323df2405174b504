//! Shutdown coordination for the gateway.

use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
#[derive(Debug, Clone)]
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for background tasks to finish, abandoning them after `deadline`.
///
/// Returns whether every task finished in time.
pub async fn drain(tasks: Vec<JoinHandle<()>>, deadline: Duration) -> bool {
    let count = tasks.len();
    match tokio::time::timeout(deadline, join_all(tasks)).await {
        Ok(results) => {
            for result in results.into_iter().filter_map(Result::err) {
                tracing::error!(error = %result, "Background task ended abnormally");
            }
            tracing::info!(tasks = count, "Background tasks stopped");
            true
        }
        Err(_) => {
            tracing::warn!(tasks = count, deadline = ?deadline, "Background tasks did not stop in time");
            false
        }
    }
}
