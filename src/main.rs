use std::sync::Arc;

mod config;
mod error;
mod handler;
mod http;
mod logger;
mod mailer;
mod server;
mod storage;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.to_string());
    let cfg = config::Config::load_from(&config_path)?;
    logger::init(&cfg)?;

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = cfg.get_socket_addr()?;
    let listener = server::create_listener(addr).map_err(|e| {
        logger::log_error(&format!("Failed to bind {addr}: {e}"));
        e
    })?;

    if cfg.mail.username.is_empty() {
        logger::log_warning("mail.username is empty, the provider session will not authenticate");
    }

    let state = Arc::new(config::AppState::new(&cfg));
    logger::log_server_start(&addr, &cfg);

    let signals = Arc::new(server::SignalHandler::new());
    server::start_signal_handler(Arc::clone(&signals));

    server::start_server_loop(listener, state, Arc::clone(&signals.shutdown)).await;
    Ok(())
}
