//! Graceful shutdown coordination.

use tokio::sync::broadcast;

/// Shutdown broadcaster. Long-running tasks subscribe; triggering wakes
/// every listener.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Signal shutdown to every listener.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// One task's view of the shutdown signal.
pub struct ShutdownListener {
    rx: broadcast::Receiver<()>,
}

impl ShutdownListener {
    /// Resolve when shutdown is triggered (or the coordinator is gone).
    pub async fn wait(&mut self) {
        let _ = self.rx.recv().await;
    }
}
