//! Request and response bodies of the JSON endpoints

use serde::Serialize;
use serde_json::Value;

use crate::error::AppError;

pub const MISSING_FIELDS: &str = "Thiếu subject hoặc message";

/// `GET /test`
#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    pub message: &'static str,
    pub timestamp: String,
    pub method: &'static str,
}

/// `POST /test-post`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EchoResponse {
    pub message: &'static str,
    pub received_data: Value,
    pub timestamp: String,
}

/// `POST /test-email-fake`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FakeEmailResponse {
    pub success: bool,
    pub message: &'static str,
    pub fake_message_id: String,
    pub timestamp: String,
}

/// `POST /send-email` success
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailResponse {
    pub success: bool,
    pub message: &'static str,
    pub message_id: String,
    pub timestamp: String,
}

/// `GET /health`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    /// Seconds since the server started
    pub uptime: f64,
    pub memory: MemoryUsage,
    pub active_connections: usize,
}

/// Process memory in bytes
#[derive(Debug, Serialize, Default, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub rss: u64,
    pub virtual_memory: u64,
}

/// Validated `/send-email` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailRequest {
    pub subject: String,
    pub message: String,
}

impl EmailRequest {
    /// Both fields must be non-empty strings
    pub fn from_body(body: &Value) -> Result<Self, AppError> {
        match (required_text(body, "subject"), required_text(body, "message")) {
            (Some(subject), Some(message)) => Ok(Self { subject, message }),
            _ => Err(AppError::Validation(MISSING_FIELDS.to_string())),
        }
    }
}

fn required_text(body: &Value, field: &str) -> Option<String> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
