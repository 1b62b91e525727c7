//! Delivery error taxonomy.

use std::time::Duration;

use super::smtp::SmtpError;

/// Why a delivery failed. Every variant is reported to HTTP callers as a 500.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// A connection, greeting, socket or stage deadline expired.
    #[error("{0}")]
    Timeout(String),

    /// The provider rejected the credentials.
    #[error("{0}")]
    Authentication(String),

    /// Host lookup or connection establishment failed.
    #[error("{0}")]
    Network(String),

    /// Anything else reported by the provider or the transport.
    #[error("{0}")]
    Unknown(String),
}

impl DeliveryError {
    /// Stage deadline lost.
    pub fn deadline(description: &str, budget: Duration) -> Self {
        Self::Timeout(format!("{description} ({}ms)", budget.as_millis()))
    }

    /// Fallback adapter for failures that only come with a free-text
    /// description.
    pub fn classify(description: impl Into<String>) -> Self {
        let description = description.into();
        let lower = description.to_lowercase();

        if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout(description)
        } else if lower.contains("authentication") {
            Self::Authentication(description)
        } else if lower.contains("network")
            || lower.contains("enotfound")
            || lower.contains("failed to lookup address")
        {
            Self::Network(description)
        } else {
            Self::Unknown(description)
        }
    }

    /// Stable name reported as `errorType`.
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "DeliveryTimeoutError",
            Self::Authentication(_) => "AuthenticationError",
            Self::Network(_) => "NetworkError",
            Self::Unknown(_) => "UnknownDeliveryError",
        }
    }

    /// Message shown to the person who submitted the form.
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout(_) => {
                "Timeout - Mất quá nhiều thời gian để kết nối email server".to_string()
            }
            Self::Authentication(_) => {
                "Lỗi xác thực Gmail - Kiểm tra username/password".to_string()
            }
            Self::Network(_) => "Lỗi kết nối mạng - Kiểm tra internet".to_string(),
            Self::Unknown(detail) => detail.clone(),
        }
    }
}

impl From<SmtpError> for DeliveryError {
    fn from(err: SmtpError) -> Self {
        use std::io::ErrorKind;

        let description = err.to_string();
        match err {
            SmtpError::Timeout { .. } => Self::Timeout(description),
            SmtpError::Auth { .. } => Self::Authentication(description),
            SmtpError::Lookup { .. } | SmtpError::Connect { .. } => Self::Network(description),
            SmtpError::Io(ref io) => match io.kind() {
                ErrorKind::TimedOut => Self::Timeout(description),
                ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
                | ErrorKind::BrokenPipe => Self::Network(description),
                _ => Self::classify(description),
            },
            SmtpError::Rejected { .. } | SmtpError::Tls(_) | SmtpError::Protocol(_) => {
                Self::classify(description)
            }
        }
    }
}
