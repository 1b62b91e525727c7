// Server loop module
// Accepts connections until shutdown is requested, then drains them

use hyper_util::server::graceful::GracefulShutdown;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use super::connection::accept_connection;
use crate::config;
use crate::logger;

/// Run the accept loop.
///
/// Returns once `shutdown` is notified and open connections have finished or
/// `performance.shutdown_grace_ms` has elapsed, whichever comes first.
pub async fn start_server_loop(
    listener: TcpListener,
    state: Arc<config::AppState>,
    shutdown: Arc<Notify>,
) {
    let graceful = GracefulShutdown::new();

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, &state, &graceful);
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }

            () = shutdown.notified() => break,
        }
    }

    // Stop accepting before draining
    drop(listener);

    let grace = state.config.performance.shutdown_grace();
    tokio::select! {
        () = graceful.shutdown() => {}
        () = tokio::time::sleep(grace) => {
            logger::log_warning(&format!(
                "Connections still open after {}ms, closing",
                grace.as_millis()
            ));
        }
    }

    logger::log_shutdown_complete(state.active_connections.load(Ordering::SeqCst));
}
