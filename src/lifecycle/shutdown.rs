//! Shutdown coordination.

use std::future::Future;

use tokio::sync::broadcast;

/// Broadcast handle that stops every listener of one process.
///
/// Clones share the same channel; any clone can trigger.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Receiver for loops that `select!` on shutdown.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Future resolving on shutdown, for `axum::serve(..).with_graceful_shutdown`.
    ///
    /// Subscribes immediately, so a trigger after this call is never missed.
    pub fn notified(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            let _ = rx.recv().await;
        }
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_reaches_every_waiter() {
        let shutdown = Shutdown::new();
        let waiter = shutdown.notified();
        let mut rx = shutdown.clone().subscribe();

        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap();
        assert!(rx.recv().await.is_ok());
    }
}
