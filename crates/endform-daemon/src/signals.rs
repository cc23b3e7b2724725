//! Signal handling for graceful daemon shutdown.
//!
//! SIGTERM and SIGINT (Ctrl+C elsewhere) flip a shared shutdown flag and
//! wake every task holding a shutdown receiver: the poller and the HTTP
//! server.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Signal types that the daemon handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// SIGTERM - Graceful termination request.
    Terminate,
    /// SIGINT - Interrupt (Ctrl+C).
    Interrupt,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Terminate => write!(f, "SIGTERM"),
            SignalKind::Interrupt => write!(f, "SIGINT"),
        }
    }
}

/// Shared state for signal handling.
#[derive(Debug, Default)]
pub struct SignalState {
    shutdown_requested: AtomicBool,
    signal_count: AtomicU32,
}

impl SignalState {
    /// Check if shutdown has been requested.
    #[inline]
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Relaxed)
    }

    /// Total number of signals received.
    pub fn signal_count(&self) -> u32 {
        self.signal_count.load(Ordering::Relaxed)
    }

    fn record_signal(&self) {
        self.signal_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Handle for signal management.
#[derive(Clone)]
pub struct SignalHandler {
    state: Arc<SignalState>,
    tx: Arc<watch::Sender<bool>>,
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHandler {
    /// Create a handler. No OS handlers are installed until [`listen`](Self::listen).
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            state: Arc::new(SignalState::default()),
            tx: Arc::new(tx),
        }
    }

    /// Install OS signal handlers on the current tokio runtime.
    #[cfg(unix)]
    pub fn listen(&self) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind as UnixSignal};

        let mut term = signal(UnixSignal::terminate())?;
        let mut int = signal(UnixSignal::interrupt())?;
        let handler = self.clone();

        tokio::spawn(async move {
            let kind = tokio::select! {
                _ = term.recv() => SignalKind::Terminate,
                _ = int.recv() => SignalKind::Interrupt,
            };
            handler.on_signal(kind);
        });

        debug!("Unix signal handlers registered");
        Ok(())
    }

    /// Install OS signal handlers on the current tokio runtime.
    #[cfg(not(unix))]
    pub fn listen(&self) -> std::io::Result<()> {
        let handler = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                handler.on_signal(SignalKind::Interrupt);
            }
        });
        Ok(())
    }

    fn on_signal(&self, kind: SignalKind) {
        info!(signal = %kind, "Shutdown signal received");
        self.state.record_signal();
        self.request_shutdown();
    }

    /// Check if shutdown has been requested.
    #[inline]
    pub fn shutdown_requested(&self) -> bool {
        self.state.shutdown_requested()
    }

    /// Manually request shutdown.
    pub fn request_shutdown(&self) {
        if !self.state.shutdown_requested.swap(true, Ordering::Relaxed) {
            debug!("Shutdown requested");
        }
        self.tx.send_replace(true);
    }

    /// Receiver that changes to `true` on shutdown.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Resolve once shutdown has been requested.
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Get the signal state for inspection.
    pub fn state(&self) -> &SignalState {
        &self.state
    }
}
