//! Diagnostic endpoints: liveness probe, echo, simulated send and health.

use hyper::StatusCode;
use serde_json::Value;
use std::sync::atomic::Ordering;
use std::time::Duration;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

use super::types::{EchoResponse, FakeEmailResponse, HealthResponse, MemoryUsage, ProbeResponse};
use crate::config::AppState;
use crate::error::AppError;
use crate::http::{json_response, timestamp, HttpResponse};

pub fn probe() -> Result<HttpResponse, AppError> {
    tracing::info!("Test endpoint called");
    Ok(json_response(
        StatusCode::OK,
        &ProbeResponse {
            message: "Server is working!",
            timestamp: timestamp(),
            method: "GET",
        },
    ))
}

pub fn echo(body: Value) -> Result<HttpResponse, AppError> {
    tracing::info!("Test POST endpoint called");
    Ok(json_response(
        StatusCode::OK,
        &EchoResponse {
            message: "POST request thành công!",
            received_data: body,
            timestamp: timestamp(),
        },
    ))
}

/// Pretends to deliver a message without contacting the provider
pub async fn fake_email(body: &Value, state: &AppState) -> Result<HttpResponse, AppError> {
    tracing::info!("Fake email endpoint called");
    if let Some(subject) = body.get("subject").and_then(Value::as_str) {
        tracing::info!(subject, "Would send email");
    }

    tokio::time::sleep(Duration::from_millis(state.config.diagnostics.fake_delay_ms)).await;

    Ok(json_response(
        StatusCode::OK,
        &FakeEmailResponse {
            success: true,
            message: "Email fake đã được \"gửi\" thành công!",
            fake_message_id: format!("fake-{}", chrono::Utc::now().timestamp_millis()),
            timestamp: timestamp(),
        },
    ))
}

pub fn health(state: &AppState) -> Result<HttpResponse, AppError> {
    Ok(json_response(
        StatusCode::OK,
        &HealthResponse {
            status: "OK",
            timestamp: timestamp(),
            uptime: state.started_at.elapsed().as_secs_f64(),
            memory: memory_usage(),
            active_connections: state.active_connections.load(Ordering::Relaxed),
        },
    ))
}

/// Memory of this process; zeros when the platform does not report it
fn memory_usage() -> MemoryUsage {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return MemoryUsage::default();
    };

    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_memory(),
    );

    system
        .process(pid)
        .map(|process| MemoryUsage {
            rss: process.memory(),
            virtual_memory: process.virtual_memory(),
        })
        .unwrap_or_default()
}
