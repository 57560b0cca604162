//! Cooperative shutdown.
//!
//! A stop request is observed between cycles; an in-flight cycle always runs
//! to completion. Sleepers waiting for the next cycle wake immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl-C
    Interrupt,
    /// Requested from code (e.g. `once` mode finishing)
    Requested,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "interrupt"),
            ShutdownSignal::Requested => write!(f, "requested"),
        }
    }
}

/// Shared stop flag with an async wake-up
#[derive(Clone)]
pub struct GracefulShutdown {
    requested: Arc<AtomicBool>,
    signal_tx: Arc<watch::Sender<Option<ShutdownSignal>>>,
    signal_rx: watch::Receiver<Option<ShutdownSignal>>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (signal_tx, signal_rx) = watch::channel(None);
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            signal_tx: Arc::new(signal_tx),
            signal_rx,
        }
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Request shutdown with specified signal type
    pub fn request_shutdown(&self, signal: ShutdownSignal) {
        if self.requested.swap(true, Ordering::SeqCst) {
            warn!("Shutdown already requested, ignoring duplicate signal: {}", signal);
            return;
        }

        info!("Shutdown requested: {}", signal);
        let _ = self.signal_tx.send(Some(signal));
    }

    /// Resolve once shutdown has been requested
    pub async fn wait(&self) {
        let mut rx = self.signal_rx.clone();
        while rx.borrow_and_update().is_none() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Request shutdown when Ctrl-C arrives
    pub fn listen_for_ctrl_c(&self) {
        let shutdown = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => shutdown.request_shutdown(ShutdownSignal::Interrupt),
                Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
            }
        });
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}
