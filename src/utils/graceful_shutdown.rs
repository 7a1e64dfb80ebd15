//! Shutdown signalling.
//!
//! The first SIGINT/SIGTERM starts a graceful drain: the health status flips
//! to 503, the listener stops accepting and in-flight requests are given
//! until the shutdown timeout. A second signal is the operator escape hatch
//! and forces an immediate stop.
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use eyre::Result;
use tokio::sync::broadcast;

/// Why the process is coming down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// First signal: drain in-flight work.
    Graceful,
    /// Second signal: stop immediately.
    Force,
}

/// Broadcasts shutdown signals to every interested task.
pub struct GracefulShutdown {
    shutdown_tx: broadcast::Sender<ShutdownReason>,
    shutdown_initiated: Arc<AtomicBool>,
    signals_seen: AtomicUsize,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
            signals_seen: AtomicUsize::new(0),
        }
    }

    /// Get a receiver for shutdown signals. Subscribe before triggering is
    /// possible, or the signal is missed.
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Relaxed)
    }

    /// Register one shutdown request (a signal, or a test driving the
    /// lifecycle by hand). The first request drains, every later one forces.
    pub fn trigger_shutdown(&self) -> ShutdownReason {
        self.shutdown_initiated.store(true, Ordering::Relaxed);
        let reason = if self.signals_seen.fetch_add(1, Ordering::SeqCst) == 0 {
            ShutdownReason::Graceful
        } else {
            ShutdownReason::Force
        };
        let _ = self.shutdown_tx.send(reason);
        reason
    }

    /// Listen for OS signals until a forced shutdown has been requested.
    #[cfg(unix)]
    pub async fn run_signal_handler(&self) -> Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        tracing::info!("signal handler started, listening for SIGINT and SIGTERM");
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {}
                _ = sigterm.recv() => {}
            }
            let reason = self.trigger_shutdown();
            tracing::info!(?reason, "shutdown signal received");
            if reason == ShutdownReason::Force {
                return Ok(());
            }
        }
    }

    /// Listen for OS signals until a forced shutdown has been requested.
    #[cfg(not(unix))]
    pub async fn run_signal_handler(&self) -> Result<()> {
        tracing::info!("signal handler started, listening for ctrl-c");

        loop {
            tokio::signal::ctrl_c().await?;
            let reason = self.trigger_shutdown();
            tracing::info!(?reason, "shutdown signal received");
            if reason == ShutdownReason::Force {
                return Ok(());
            }
        }
    }

    /// Block until any watched shutdown reason arrives.
    pub async fn wait_for(&self, wanted: ShutdownReason) {
        let mut rx = self.subscribe();
        loop {
            match rx.recv().await {
                Ok(reason) if reason == wanted => return,
                Ok(_) => continue,
                // Channel closed or lagged: treat as shutdown.
                Err(broadcast::error::RecvError::Closed) => return,
                Err(broadcast::error::RecvError::Lagged(_)) => return,
            }
        }
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_starts_without_shutdown() {
        let shutdown = GracefulShutdown::new();
        assert!(!shutdown.is_shutdown_initiated());
    }

    #[tokio::test]
    async fn test_first_trigger_is_graceful() {
        let shutdown = GracefulShutdown::new();
        let mut rx = shutdown.subscribe();

        assert_eq!(shutdown.trigger_shutdown(), ShutdownReason::Graceful);
        assert!(shutdown.is_shutdown_initiated());
        assert_eq!(rx.try_recv().unwrap(), ShutdownReason::Graceful);
    }

    #[tokio::test]
    async fn test_second_trigger_escalates_to_force() {
        let shutdown = GracefulShutdown::new();
        let mut rx = shutdown.subscribe();

        shutdown.trigger_shutdown();
        assert_eq!(shutdown.trigger_shutdown(), ShutdownReason::Force);

        assert_eq!(rx.try_recv().unwrap(), ShutdownReason::Graceful);
        assert_eq!(rx.try_recv().unwrap(), ShutdownReason::Force);
    }

    #[tokio::test]
    async fn test_wait_for_skips_other_reasons() {
        let shutdown = Arc::new(GracefulShutdown::new());

        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait_for(ShutdownReason::Force).await })
        };

        // Give the waiter time to subscribe, then drain and force.
        tokio::task::yield_now().await;
        shutdown.trigger_shutdown();
        shutdown.trigger_shutdown();

        waiter.await.expect("waiter completes");
    }

    #[tokio::test]
    async fn test_multiple_subscribers_all_observe() {
        let shutdown = GracefulShutdown::new();
        let mut rx1 = shutdown.subscribe();
        let mut rx2 = shutdown.subscribe();

        shutdown.trigger_shutdown();

        assert_eq!(rx1.try_recv().unwrap(), ShutdownReason::Graceful);
        assert_eq!(rx2.try_recv().unwrap(), ShutdownReason::Graceful);
    }
}
