// Configuration types module
// Defines all configuration-related data structures

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub http: HttpConfig,
    pub mail: MailConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common or json)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// Performance configuration, all values in milliseconds
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    /// Inactivity budget for reading a request and producing its response
    pub request_timeout_ms: u64,
    /// Keep-alive connections idle longer than this are closed
    pub idle_timeout_ms: u64,
    /// How long shutdown waits for in-flight connections
    pub shutdown_grace_ms: u64,
}

impl PerformanceConfig {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// HTTP configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    pub server_name: String,
    pub max_body_size: u64,
}

/// How the SMTP session is secured
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MailSecurity {
    /// TLS from the first byte (port 465)
    Tls,
    /// Plain connection upgraded with STARTTLS (port 587)
    Starttls,
    /// No encryption, for local relays and tests
    None,
}

/// Mail provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub security: MailSecurity,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub from: String,
    pub to: String,
    pub client_hostname: String,
    pub connection_timeout_ms: u64,
    pub greeting_timeout_ms: u64,
    pub socket_timeout_ms: u64,
    pub verify_timeout_ms: u64,
    pub send_timeout_ms: u64,
}

/// Counter persistence configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub counter_file: String,
}

/// Settings for the diagnostic endpoints
#[derive(Debug, Deserialize, Clone)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_fake_delay_ms")]
    pub fake_delay_ms: u64,
}

const fn default_fake_delay_ms() -> u64 {
    2000
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            fake_delay_ms: default_fake_delay_ms(),
        }
    }
}
