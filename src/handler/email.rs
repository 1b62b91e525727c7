//! `POST /send-email`: validate, relay, then count the vote.

use hyper::StatusCode;
use serde_json::Value;

use super::types::{EmailRequest, SendEmailResponse};
use crate::config::AppState;
use crate::error::AppError;
use crate::http::{json_response, timestamp, HttpResponse};

pub async fn send_email(body: &Value, state: &AppState) -> Result<HttpResponse, AppError> {
    tracing::info!("=== EMAIL REQUEST START ===");

    let request = EmailRequest::from_body(body).map_err(|e| {
        tracing::warn!("Missing required fields");
        e
    })?;

    let delivery = state
        .dispatcher
        .dispatch(&request.subject, &request.message)
        .await
        .map_err(|e| {
            tracing::error!(
                error_type = e.error_type(),
                error = %e,
                "=== EMAIL REQUEST FAILED ==="
            );
            e
        })?;

    // Only messages the provider accepted are counted
    if let Some(record) = state.counters.increment_for(&request.message).await {
        tracing::info!(
            jopi = record.jopi,
            doki = record.doki,
            file = %state.counters.path().display(),
            "Counters updated"
        );
    }

    tracing::info!("=== EMAIL REQUEST SUCCESS ===");
    Ok(json_response(
        StatusCode::OK,
        &SendEmailResponse {
            success: true,
            message: "Email đã được gửi thành công!",
            message_id: delivery.message_id.unwrap_or_default(),
            timestamp: timestamp(),
        },
    ))
}
