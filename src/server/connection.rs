// Connection handling module
// Serves one accepted TCP connection over HTTP/1.1

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::config;
use crate::handler;
use crate::logger;

/// Serve a connection in its own task.
///
/// The connection is registered with `graceful` so shutdown can let in-flight
/// requests finish. A client that sends no request headers within the idle
/// timeout is disconnected.
pub fn accept_connection(
    stream: tokio::net::TcpStream,
    peer_addr: std::net::SocketAddr,
    state: &Arc<config::AppState>,
    graceful: &GracefulShutdown,
) {
    state.active_connections.fetch_add(1, Ordering::SeqCst);
    logger::log_connection_accepted(&peer_addr);

    if let Err(e) = stream.set_nodelay(true) {
        logger::log_warning(&format!("Failed to set TCP_NODELAY for {peer_addr}: {e}"));
    }
    let io = TokioIo::new(stream);

    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(state.config.performance.idle_timeout())
        .keep_alive(true);

    let service_state = Arc::clone(state);
    let conn = builder.serve_connection(
        io,
        service_fn(move |req| {
            handler::handle_request(req, Arc::clone(&service_state), Some(peer_addr))
        }),
    );
    let conn = graceful.watch(conn);

    let active_connections = Arc::clone(&state.active_connections);
    tokio::spawn(async move {
        if let Err(err) = conn.await {
            logger::log_connection_error(&err);
        }
        active_connections.fetch_sub(1, Ordering::SeqCst);
    });
}
