// Configuration module entry point
// Manages application configuration and shared runtime state

mod state;
mod types;

use std::net::SocketAddr;

// Re-export public types
pub use state::AppState;
pub use types::{Config, MailConfig, MailSecurity};

/// Default config file, resolved without extension
pub const DEFAULT_CONFIG_PATH: &str = "config";

impl Config {
    /// Load configuration from specified file path (without extension)
    /// Environment variables use the `MAILER_` prefix and `__` between sections,
    /// e.g. `MAILER_MAIL__PASSWORD`
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("MAILER").separator("__"))
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.access_log_format", "combined")?
            .set_default("performance.request_timeout_ms", 60_000)?
            .set_default("performance.idle_timeout_ms", 120_000)?
            .set_default("performance.shutdown_grace_ms", 10_000)?
            .set_default("http.server_name", "Birthday-Mailer/0.1")?
            .set_default("http.max_body_size", 10_485_760)? // 10MB
            .set_default("mail.host", "smtp.gmail.com")?
            .set_default("mail.port", 465)?
            .set_default("mail.security", "tls")?
            .set_default("mail.username", "")?
            .set_default("mail.password", "")?
            .set_default("mail.from", "sender@example.com")?
            .set_default("mail.to", "recipient@example.com")?
            .set_default("mail.client_hostname", "localhost")?
            .set_default("mail.connection_timeout_ms", 60_000)?
            .set_default("mail.greeting_timeout_ms", 30_000)?
            .set_default("mail.socket_timeout_ms", 60_000)?
            .set_default("mail.verify_timeout_ms", 30_000)?
            .set_default("mail.send_timeout_ms", 45_000)?
            .set_default("storage.counter_file", "data.json")?
            .set_default("diagnostics.fake_delay_ms", 2000)?
            .build()?;

        settings.try_deserialize()
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}
