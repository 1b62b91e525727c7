//! `GET /stats`

use hyper::StatusCode;

use crate::config::AppState;
use crate::error::AppError;
use crate::http::{json_response, HttpResponse};

/// Current tallies; storage problems still answer 200 with zeros and an
/// `error` field
pub async fn stats(state: &AppState) -> Result<HttpResponse, AppError> {
    let snapshot = state.counters.read().await;
    Ok(json_response(StatusCode::OK, &snapshot))
}
