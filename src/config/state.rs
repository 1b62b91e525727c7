// Application state module
// Shared handles used by every request handler

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Instant;

use super::types::Config;
use crate::mailer::{MailDispatcher, MailTransport, SmtpTransport};
use crate::storage::CounterStore;

/// Application state
pub struct AppState {
    pub config: Config,
    pub started_at: Instant,
    pub dispatcher: MailDispatcher,
    pub counters: CounterStore,
    pub active_connections: Arc<AtomicUsize>,
}

impl AppState {
    /// Create `AppState` that delivers through the configured SMTP provider
    pub fn new(config: &Config) -> Self {
        let transport = Arc::new(SmtpTransport::new(config.mail.clone()));
        Self::with_transport(config, transport)
    }

    /// Create `AppState` around an arbitrary transport
    pub fn with_transport(config: &Config, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            config: config.clone(),
            started_at: Instant::now(),
            dispatcher: MailDispatcher::new(&config.mail, transport),
            counters: CounterStore::new(&config.storage.counter_file),
            active_connections: Arc::new(AtomicUsize::new(0)),
        }
    }
}
