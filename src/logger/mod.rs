//! Logger module
//!
//! Provides logging utilities for the mail relay including:
//! - `tracing` subscriber setup from the logging configuration
//! - Server lifecycle logging
//! - Request and access logging

mod format;

pub use format::AccessLogEntry;

use crate::config::Config;
use hyper::{Method, Uri};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global subscriber
///
/// `RUST_LOG` takes precedence over `logging.level`.
/// Should be called once at application startup.
pub fn init(config: &Config) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .compact(),
        )
        .try_init()
}

pub fn log_server_start(addr: &SocketAddr, config: &Config) {
    tracing::info!("======================================");
    tracing::info!("Birthday mailer started");
    tracing::info!("Listening on: http://{addr}");
    tracing::info!("Log level: {}", config.logging.level);
    if let Some(workers) = config.server.workers {
        tracing::info!("Worker threads: {workers}");
    }
    tracing::info!(
        "Mail provider: {}:{} ({:?})",
        config.mail.host,
        config.mail.port,
        config.mail.security
    );
    tracing::info!("Counter file: {}", config.storage.counter_file);
    tracing::info!("======================================");
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    tracing::debug!("[Connection] Accepted from: {peer_addr}");
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    tracing::error!("Failed to serve connection: {err:?}");
}

/// Method, URL and timestamp of an incoming request
pub fn log_request(method: &Method, uri: &Uri) {
    tracing::info!(
        "{} - {method} {uri}",
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    );
}

/// Request body, only called for non-empty JSON bodies
pub fn log_request_body(body: &serde_json::Value) {
    let pretty = serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string());
    tracing::info!("Request body: {pretty}");
}

/// Formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    tracing::info!(target: "access", "{}", entry.format(format));
}

pub fn log_route_not_found(url: &str) {
    tracing::info!("Route not found: {url}");
}

pub fn log_error(message: &str) {
    tracing::error!("{message}");
}

pub fn log_warning(message: &str) {
    tracing::warn!("{message}");
}

pub fn log_shutdown_requested(signal: &str) {
    tracing::info!("{signal} received, shutting down server...");
}

pub fn log_shutdown_complete(remaining: usize) {
    if remaining == 0 {
        tracing::info!("Server stopped");
    } else {
        tracing::warn!("Server stopped with {remaining} connection(s) still open");
    }
}
