//! Shutdown coordination.

use std::sync::Arc;

use tokio::sync::watch;

/// Coordinator for shutting down accept loops and connections.
///
/// Backed by a watch channel, so a receiver created after `trigger` still
/// observes the signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger the shutdown signal. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Number of tasks still holding a signal.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of [`Shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once shutdown is triggered.
    pub async fn recv(&mut self) {
        if self.rx.wait_for(|triggered| *triggered).await.is_err() {
            // Coordinator dropped without triggering.
            std::future::pending::<()>().await;
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_late_subscriber_sees_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let mut signal = shutdown.subscribe();
        assert!(signal.is_triggered());
        tokio::time::timeout(Duration::from_secs(1), signal.recv())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_recv_waits_for_trigger() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        assert!(tokio::time::timeout(Duration::from_millis(50), signal.recv())
            .await
            .is_err());

        let trigger = shutdown.clone();
        tokio::spawn(async move { trigger.trigger() });
        tokio::time::timeout(Duration::from_secs(1), signal.recv())
            .await
            .unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_dropped_coordinator_does_not_fire() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        drop(shutdown);
        assert!(tokio::time::timeout(Duration::from_millis(50), signal.recv())
            .await
            .is_err());
    }
}
