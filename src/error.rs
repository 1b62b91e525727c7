//! Request-level error type and its JSON rendering.

use hyper::StatusCode;
use serde_json::json;

use crate::http::{json_response, timestamp, HttpResponse};
use crate::mailer::DeliveryError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Required fields missing from the payload
    #[error("{0}")]
    Validation(String),

    /// The mail provider did not accept the message
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// No handler for this method and path; carries the requested URL
    #[error("Không tìm thấy endpoint: {0}")]
    RouteNotFound(String),

    /// The request body did not arrive within the request budget
    #[error("Request body timeout")]
    BodyTimeout,

    /// The handler did not answer within the request budget
    #[error("Response timeout")]
    HandlerTimeout,

    /// Anything else, including malformed bodies and handler panics
    #[error("{0}")]
    Unhandled(String),
}

impl AppError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::RouteNotFound(_) => StatusCode::NOT_FOUND,
            Self::BodyTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::HandlerTimeout => StatusCode::SERVICE_UNAVAILABLE,
            Self::Delivery(_) | Self::Unhandled(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn into_response(self) -> HttpResponse {
        let status = self.status();
        let body = match &self {
            Self::Validation(_) | Self::RouteNotFound(_) => json!({
                "success": false,
                "message": self.to_string(),
            }),
            Self::Delivery(e) => json!({
                "success": false,
                "message": e.user_message(),
                "errorType": e.error_type(),
                "timestamp": timestamp(),
            }),
            Self::BodyTimeout | Self::HandlerTimeout | Self::Unhandled(_) => json!({
                "success": false,
                "message": format!("Lỗi server: {self}"),
                "timestamp": timestamp(),
            }),
        };
        json_response(status, &body)
    }
}
