// Signal handling module
//
// Supported signals:
// - SIGTERM: Graceful shutdown
// - SIGINT:  Graceful shutdown (Ctrl+C)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::logger;

/// Signal handler state
pub struct SignalHandler {
    /// Shutdown signal (SIGTERM, SIGINT)
    pub shutdown: Arc<Notify>,
    /// Whether shutdown has been requested
    pub shutdown_requested: Arc<AtomicBool>,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self {
            shutdown: Arc::new(Notify::new()),
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Record the request and wake the accept loop. The permit is stored, so
    /// a loop that is not waiting yet still sees it.
    pub fn trigger(&self, signal: &str) {
        logger::log_shutdown_requested(signal);
        self.shutdown_requested.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Start signal handlers (Unix)
///
/// Falls back to Ctrl+C only when the Unix handlers cannot be registered.
#[cfg(unix)]
pub fn start_signal_handler(handler: Arc<SignalHandler>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let registered = signal(SignalKind::terminate())
            .and_then(|term| signal(SignalKind::interrupt()).map(|int| (term, int)));

        match registered {
            Ok((mut sigterm, mut sigint)) => {
                tracing::debug!("Signal handlers registered (pid {})", std::process::id());
                tokio::select! {
                    _ = sigterm.recv() => handler.trigger("SIGTERM"),
                    _ = sigint.recv() => handler.trigger("SIGINT"),
                }
            }
            Err(e) => {
                logger::log_error(&format!("Failed to register signal handlers: {e}"));
                if tokio::signal::ctrl_c().await.is_ok() {
                    handler.trigger("Ctrl+C");
                }
            }
        }
    });
}

/// Non-Unix fallback - only handles Ctrl+C
#[cfg(not(unix))]
pub fn start_signal_handler(handler: Arc<SignalHandler>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handler.trigger("Ctrl+C");
        }
    });
}
