//! Shutdown coordination between the server, the rate window sweeper and
//! whoever owns the process (`main`, or a test harness).
//!
//! State lives in a `watch` channel: a task that takes its [`ShutdownSignal`]
//! after the trigger still observes it.

use tokio::sync::watch;

/// Owner side. Triggering it, or dropping it, releases every signal.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// A handle that resolves once shutdown starts.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Start shutting down. Returns `false` if shutdown had already started.
    pub fn trigger(&self) -> bool {
        let first = self
            .tx
            .send_if_modified(|stopping| !std::mem::replace(stopping, true));
        if first {
            tracing::info!(listeners = self.tx.receiver_count(), "Shutdown triggered");
        }
        first
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Signals still held by running tasks.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Task side of [`Shutdown`]. Cheap to clone; each task keeps its own.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait until shutdown starts or the coordinator is gone.
    pub async fn recv(&mut self) {
        // An error means the sender was dropped, which also ends the service.
        let _ = self.rx.wait_for(|stopping| *stopping).await;
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_trigger_reaches_all_signals() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.signal();
        let mut b = a.clone();
        assert_eq!(shutdown.receiver_count(), 2);

        assert!(shutdown.trigger());
        timeout(WAIT, a.recv()).await.unwrap();
        timeout(WAIT, b.recv()).await.unwrap();
        assert!(a.is_triggered());
    }

    #[tokio::test]
    async fn test_late_signal_sees_earlier_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let mut late = shutdown.signal();
        assert!(late.is_triggered());
        timeout(WAIT, late.recv()).await.unwrap();
    }

    #[test]
    fn test_trigger_is_idempotent() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());
        assert!(shutdown.trigger());
        assert!(!shutdown.trigger());
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_dropping_coordinator_releases_waiters() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.signal();
        let waiter = tokio::spawn(async move { signal.recv().await });

        drop(shutdown);
        timeout(WAIT, waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_untriggered_signal_stays_pending() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.signal();
        assert!(timeout(Duration::from_millis(20), signal.recv()).await.is_err());
    }
}
