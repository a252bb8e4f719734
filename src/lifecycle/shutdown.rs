//! Shutdown coordination.

use std::future::Future;

use tokio::sync::{broadcast, watch};

/// Coordinator for graceful shutdown.
///
/// Background loops subscribe to the broadcast channel; the HTTP server waits
/// on [`Shutdown::wait`], which also resolves for waiters created after the
/// trigger.
#[derive(Debug)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    triggered: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        let (triggered, _) = watch::channel(false);
        Self { tx, triggered }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal. Later calls are no-ops.
    pub fn trigger(&self) {
        if self.triggered.send_replace(true) {
            return;
        }
        let _ = self.tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        *self.triggered.borrow()
    }

    /// Future resolving once shutdown has been triggered.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.triggered.subscribe();
        async move {
            let _ = rx.wait_for(|triggered| *triggered).await;
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
