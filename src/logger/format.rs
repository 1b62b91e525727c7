//! Access log format module
//!
//! Supports:
//! - `combined` (Apache/Nginx combined format)
//! - `common` (Common Log Format - CLF)
//! - `json` (one JSON object per line)
//!
//! Unknown names fall back to `combined`.

use chrono::Local;

/// Access log entry for one served request
#[derive(Debug, Clone)]
pub struct AccessLogEntry {
    /// Client IP address
    pub remote_addr: String,
    /// Request timestamp
    pub time: chrono::DateTime<Local>,
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Request URI including any query string
    pub uri: String,
    /// HTTP version (1.0, 1.1)
    pub http_version: String,
    /// Response status code
    pub status: u16,
    /// Response body size in bytes
    pub body_bytes: usize,
    /// User-Agent header
    pub user_agent: Option<String>,
    /// Request processing time in microseconds
    pub request_time_us: u64,
}

impl AccessLogEntry {
    /// Create a new access log entry with current timestamp
    pub fn new(remote_addr: String, method: String, uri: String) -> Self {
        Self {
            remote_addr,
            time: Local::now(),
            method,
            uri,
            http_version: "1.1".to_string(),
            status: 200,
            body_bytes: 0,
            user_agent: None,
            request_time_us: 0,
        }
    }

    /// Format the log entry according to the specified format
    pub fn format(&self, format: &str) -> String {
        match format {
            "common" => self.format_common(),
            "json" => self.format_json(),
            _ => self.format_combined(),
        }
    }

    /// `$remote_addr - - [$time_local] "$request" $status $body_bytes_sent "-" "$http_user_agent" $request_time`
    fn format_combined(&self) -> String {
        format!(
            "{} \"-\" \"{}\" {:.3}",
            self.format_common(),
            self.user_agent.as_deref().unwrap_or("-"),
            self.request_time_secs(),
        )
    }

    /// `$remote_addr - - [$time_local] "$request" $status $body_bytes_sent`
    fn format_common(&self) -> String {
        format!(
            "{} - - [{}] \"{} {} HTTP/{}\" {} {}",
            self.remote_addr,
            self.time.format("%d/%b/%Y:%H:%M:%S %z"),
            self.method,
            self.uri,
            self.http_version,
            self.status,
            self.body_bytes,
        )
    }

    fn format_json(&self) -> String {
        serde_json::json!({
            "remote_addr": self.remote_addr,
            "time": self.time.to_rfc3339(),
            "method": self.method,
            "uri": self.uri,
            "http_version": self.http_version,
            "status": self.status,
            "body_bytes": self.body_bytes,
            "user_agent": self.user_agent,
            "request_time_us": self.request_time_us,
        })
        .to_string()
    }

    #[allow(clippy::cast_precision_loss)]
    fn request_time_secs(&self) -> f64 {
        self.request_time_us as f64 / 1_000_000.0
    }
}
