use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

/// Cooperative shutdown shared by the server and background tasks.
///
/// ```ignore
/// let shutdown = ShutdownSignal::new();
/// let waiter = shutdown.clone();
/// axum::serve(listener, app).with_graceful_shutdown(async move { waiter.wait().await });
/// shutdown.trigger();
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: broadcast::Sender<()>,
    fired: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Fire the signal. Repeated calls are no-ops.
    pub fn trigger(&self) {
        if !self.fired.swap(true, Ordering::AcqRel) {
            info!("shutdown signal triggered");
            let _ = self.tx.send(());
        }
    }

    /// Resolve once the signal has fired, including if it already had.
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        if self.is_shutting_down() {
            return;
        }
        let _ = rx.recv().await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
