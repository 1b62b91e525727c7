//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: pre-flight handling, body
//! parsing, route matching, handler isolation and the per-request deadline.

use crate::config::AppState;
use crate::error::AppError;
use crate::handler::{diagnostics, email, stats};
use crate::http::{self, HttpResponse};
use crate::logger::{self, AccessLogEntry};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{HeaderMap, CONTENT_TYPE, USER_AGENT};
use hyper::{Method, Request, Version};
use serde_json::{Map, Value};
use std::any::Any;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;

/// Endpoints served by the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Probe,
    Echo,
    FakeEmail,
    SendEmail,
    Health,
    Stats,
}

impl Route {
    /// Match a method and path. Paths compare case-insensitively, one
    /// trailing slash is ignored and HEAD is served by GET routes.
    pub fn resolve(method: &Method, path: &str) -> Option<Self> {
        let path = path.to_ascii_lowercase();
        let path = match path.strip_suffix('/') {
            Some(trimmed) if !trimmed.is_empty() => trimmed,
            _ => path.as_str(),
        };
        let is_get = *method == Method::GET || *method == Method::HEAD;
        let is_post = *method == Method::POST;

        match path {
            "/test" if is_get => Some(Self::Probe),
            "/health" if is_get => Some(Self::Health),
            "/stats" if is_get => Some(Self::Stats),
            "/test-post" if is_post => Some(Self::Echo),
            "/test-email-fake" if is_post => Some(Self::FakeEmail),
            "/send-email" if is_post => Some(Self::SendEmail),
            _ => None,
        }
    }
}

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    remote_addr: Option<SocketAddr>,
) -> Result<HttpResponse, Infallible>
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let started = Instant::now();
    let is_head = req.method() == Method::HEAD;

    let mut entry = AccessLogEntry::new(
        remote_addr.map_or_else(|| "-".to_string(), |addr| addr.ip().to_string()),
        req.method().to_string(),
        req.uri().to_string(),
    );
    entry.http_version = version_label(req.version()).to_string();
    entry.user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);

    let response = if req.method() == Method::OPTIONS {
        http::build_options_response()
    } else {
        process(req, &state)
            .await
            .unwrap_or_else(AppError::into_response)
    };
    let response = http::finalize(response, &state.config.http.server_name, is_head);

    if state.config.logging.access_log {
        entry.status = response.status().as_u16();
        entry.body_bytes = usize::try_from(response.body().size_hint().exact().unwrap_or(0))
            .unwrap_or(usize::MAX);
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

async fn process<B>(req: Request<B>, state: &Arc<AppState>) -> Result<HttpResponse, AppError>
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();
    logger::log_request(&parts.method, &parts.uri);

    let deadline = state.config.performance.request_timeout();
    let limit = usize::try_from(state.config.http.max_body_size).unwrap_or(usize::MAX);
    let body = if is_json(&parts.headers) {
        timeout(deadline, read_json_body(body, limit))
            .await
            .map_err(|_| AppError::BodyTimeout)??
    } else {
        Value::Object(Map::new())
    };
    if has_content(&body) {
        logger::log_request_body(&body);
    }

    let Some(route) = Route::resolve(&parts.method, parts.uri.path()) else {
        let url = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_string(), ToString::to_string);
        logger::log_route_not_found(&url);
        return Err(AppError::RouteNotFound(url));
    };

    // The handler runs as its own task so a panic surfaces as a JoinError.
    // On deadline the task is left to finish: a late delivery still counts.
    let task = tokio::spawn(dispatch(route, body, Arc::clone(state)));
    match timeout(deadline, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => {
            let message = if join_error.is_panic() {
                panic_message(join_error.into_panic())
            } else {
                join_error.to_string()
            };
            logger::log_error(&format!("Unhandled error in {route:?} handler: {message}"));
            Err(AppError::Unhandled(message))
        }
        Err(_) => {
            logger::log_warning(&format!(
                "{route:?} handler exceeded {}ms",
                deadline.as_millis()
            ));
            Err(AppError::HandlerTimeout)
        }
    }
}

async fn dispatch(route: Route, body: Value, state: Arc<AppState>) -> Result<HttpResponse, AppError> {
    match route {
        Route::Probe => diagnostics::probe(),
        Route::Echo => diagnostics::echo(body),
        Route::FakeEmail => diagnostics::fake_email(&body, &state).await,
        Route::SendEmail => email::send_email(&body, &state).await,
        Route::Health => diagnostics::health(&state),
        Route::Stats => stats::stats(&state).await,
    }
}

/// `application/json` or any `+json` media type, parameters ignored
fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|media| media.trim().to_ascii_lowercase())
        .is_some_and(|media| media == "application/json" || media.ends_with("+json"))
}

/// Collect the body up to `limit` bytes; blank bodies read as `{}`.
/// Only an object or an array is accepted at the top level.
async fn read_json_body<B>(body: B, limit: usize) -> Result<Value, AppError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let bytes = Limited::new(body, limit)
        .collect()
        .await
        .map_err(|e| {
            if e.is::<LengthLimitError>() {
                AppError::Unhandled("request entity too large".to_string())
            } else {
                AppError::Unhandled(e.to_string())
            }
        })?
        .to_bytes();

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    match serde_json::from_slice(&bytes) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Ok(value),
        Ok(_) => Err(AppError::Unhandled(
            "JSON body must be an object or an array".to_string(),
        )),
        Err(e) => Err(AppError::Unhandled(e.to_string())),
    }
}

fn has_content(body: &Value) -> bool {
    match body {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}

fn version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2.0",
        Version::HTTP_3 => "3.0",
        _ => "1.1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::mailer::testing::FakeTransport;
    use crate::mailer::{DeliveryError, MailTransport};
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::StatusCode;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        state: Arc<AppState>,
        transport: Arc<FakeTransport>,
        _dir: TempDir,
    }

    fn harness(transport: FakeTransport) -> Harness {
        let dir = TempDir::new().unwrap();
        let mut config = Config::load_from("definitely-missing-config-file").unwrap();
        config.storage.counter_file = dir.path().join("data.json").to_string_lossy().into_owned();
        config.logging.access_log = false;

        let transport = Arc::new(transport);
        let state = AppState::with_transport(&config, Arc::clone(&transport) as Arc<dyn MailTransport>);
        Harness {
            state: Arc::new(state),
            transport,
            _dir: dir,
        }
    }

    async fn call(state: &Arc<AppState>, method: Method, uri: &str, body: &str) -> (StatusCode, HttpResponse) {
        call_typed(state, method, uri, "application/json", body).await
    }

    async fn call_typed(
        state: &Arc<AppState>,
        method: Method,
        uri: &str,
        content_type: &str,
        body: &str,
    ) -> (StatusCode, HttpResponse) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", content_type)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap();
        let response = handle_request(req, Arc::clone(state), None).await.unwrap();
        (response.status(), response)
    }

    /// Body whose first frame never arrives
    struct StalledBody;

    impl Body for StalledBody {
        type Data = Bytes;
        type Error = Infallible;

        fn poll_frame(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Option<Result<hyper::body::Frame<Bytes>, Infallible>>> {
            std::task::Poll::Pending
        }
    }

    async fn json_body(response: HttpResponse) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_route_resolution() {
        assert_eq!(Route::resolve(&Method::GET, "/test"), Some(Route::Probe));
        assert_eq!(Route::resolve(&Method::HEAD, "/stats"), Some(Route::Stats));
        assert_eq!(Route::resolve(&Method::GET, "/Health/"), Some(Route::Health));
        assert_eq!(Route::resolve(&Method::POST, "/SEND-EMAIL"), Some(Route::SendEmail));
        assert_eq!(Route::resolve(&Method::GET, "/send-email"), None);
        assert_eq!(Route::resolve(&Method::POST, "/test"), None);
        assert_eq!(Route::resolve(&Method::GET, "/"), None);
        assert_eq!(Route::resolve(&Method::GET, "/test//"), None);
    }

    #[tokio::test]
    async fn test_probe() {
        let h = harness(FakeTransport::accepting());
        let (status, response) = call(&h.state, Method::GET, "/test", "").await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Server is working!");
        assert_eq!(body["method"], "GET");
    }

    #[tokio::test]
    async fn test_echo_returns_payload() {
        let h = harness(FakeTransport::accepting());
        let (status, response) = call(&h.state, Method::POST, "/test-post", r#"{"a":[1,2]}"#).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["message"], "POST request thành công!");
        assert_eq!(body["receivedData"], serde_json::json!({"a": [1, 2]}));
    }

    #[tokio::test]
    async fn test_empty_body_reads_as_object() {
        let h = harness(FakeTransport::accepting());
        let (_, response) = call(&h.state, Method::POST, "/test-post", "").await;
        let body = json_body(response).await;
        assert_eq!(body["receivedData"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_send_email_missing_fields() {
        let h = harness(FakeTransport::accepting());
        for payload in [r#"{"subject":"Hi"}"#, r#"{"message":"DOKI"}"#, r#"{"subject":"","message":"x"}"#, ""] {
            let (status, response) = call(&h.state, Method::POST, "/send-email", payload).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            let body = json_body(response).await;
            assert_eq!(body["success"], false);
            assert_eq!(body["message"], "Thiếu subject hoặc message");
        }
        assert!(h.transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_email_counts_vote() {
        let h = harness(FakeTransport::accepting());
        let (status, response) = call(
            &h.state,
            Method::POST,
            "/send-email",
            r#"{"subject":"Hi","message":"I love doki"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Email đã được gửi thành công!");
        assert_eq!(body["messageId"], "<fake-1@example.com>");

        let (_, response) = call(&h.state, Method::GET, "/stats", "").await;
        let stats = json_body(response).await;
        assert_eq!(stats, serde_json::json!({"jopi": 0, "doki": 1}));
    }

    #[tokio::test]
    async fn test_jopi_wins_when_both_present() {
        let h = harness(FakeTransport::accepting());
        call(
            &h.state,
            Method::POST,
            "/send-email",
            r#"{"subject":"Hi","message":"doki and JoPi"}"#,
        )
        .await;
        let (_, response) = call(&h.state, Method::GET, "/stats", "").await;
        assert_eq!(json_body(response).await, serde_json::json!({"jopi": 1, "doki": 0}));
    }

    #[tokio::test]
    async fn test_delivery_failure_leaves_counters() {
        let h = harness(FakeTransport::failing(DeliveryError::Authentication(
            "535 bad credentials".to_string(),
        )));
        let (status, response) = call(
            &h.state,
            Method::POST,
            "/send-email",
            r#"{"subject":"Hi","message":"JOPI"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["errorType"], "AuthenticationError");

        let (_, response) = call(&h.state, Method::GET, "/stats", "").await;
        assert_eq!(json_body(response).await, serde_json::json!({"jopi": 0, "doki": 0}));
    }

    #[tokio::test]
    async fn test_stats_without_file() {
        let h = harness(FakeTransport::accepting());
        let (status, response) = call(&h.state, Method::GET, "/stats", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({"jopi": 0, "doki": 0}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fake_email_waits() {
        let h = harness(FakeTransport::accepting());
        let started = tokio::time::Instant::now();
        let (status, response) = call(&h.state, Method::POST, "/test-email-fake", r#"{"subject":"x"}"#).await;
        assert!(started.elapsed() >= Duration::from_millis(2000));
        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert!(body["fakeMessageId"].as_str().unwrap().starts_with("fake-"));
        assert!(h.transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness(FakeTransport::accepting());
        let (status, response) = call(&h.state, Method::GET, "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "OK");
        assert!(body["uptime"].as_f64().unwrap() >= 0.0);
        assert!(body["memory"].is_object());
        assert_eq!(body["activeConnections"], 0);
    }

    #[tokio::test]
    async fn test_not_found_names_url() {
        let h = harness(FakeTransport::accepting());
        let (status, response) = call(&h.state, Method::GET, "/nope?x=1", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Không tìm thấy endpoint: /nope?x=1");
    }

    #[tokio::test]
    async fn test_options_preflight() {
        let h = harness(FakeTransport::accepting());
        let (status, response) = call(&h.state, Method::OPTIONS, "/send-email", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(
            response.headers()["access-control-allow-headers"],
            "Content-Type, Authorization"
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_cors_on_errors() {
        let h = harness(FakeTransport::accepting());
        let (_, response) = call(&h.state, Method::GET, "/missing", "").await;
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn test_invalid_json_is_server_error() {
        let h = harness(FakeTransport::accepting());
        let (status, response) = call(&h.state, Method::POST, "/send-email", "{not json").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert!(body["message"].as_str().unwrap().starts_with("Lỗi server: "));
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_oversized_body_is_server_error() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::load_from("definitely-missing-config-file").unwrap();
        config.storage.counter_file = dir.path().join("data.json").to_string_lossy().into_owned();
        config.http.max_body_size = 8;
        let state = Arc::new(AppState::with_transport(&config, Arc::new(FakeTransport::accepting())));

        let (status, response) = call(&state, Method::POST, "/test-post", r#"{"long":"payload"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Lỗi server: request entity too large");
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let h = harness(FakeTransport {
            panic_on_send: true,
            ..FakeTransport::accepting()
        });
        let (status, response) = call(
            &h.state,
            Method::POST,
            "/send-email",
            r#"{"subject":"Hi","message":"x"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Lỗi server: transport exploded");

        let (status, _) = call(&h.state, Method::GET, "/test", "").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_times_out() {
        let h = harness(FakeTransport {
            send_delay: Duration::from_secs(44),
            verify_delay: Duration::from_secs(29),
            ..FakeTransport::accepting()
        });
        let (status, response) = call(
            &h.state,
            Method::POST,
            "/send-email",
            r#"{"subject":"Hi","message":"DOKI"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_head_strips_body() {
        let h = harness(FakeTransport::accepting());
        let (status, response) = call(&h.state, Method::HEAD, "/test", "").await;
        assert_eq!(status, StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_non_json_content_type_reads_as_empty() {
        let h = harness(FakeTransport::accepting());
        let (status, response) = call_typed(
            &h.state,
            Method::POST,
            "/send-email",
            "text/plain",
            r#"{"subject":"Hi","message":"DOKI"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["message"], "Thiếu subject hoặc message");
        assert!(h.transport.sent.lock().unwrap().is_empty());

        let (status, response) =
            call_typed(&h.state, Method::POST, "/test-post", "text/plain", "hello").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(response).await["receivedData"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_missing_content_type_reads_as_empty() {
        let h = harness(FakeTransport::accepting());
        let req = Request::builder()
            .method(Method::POST)
            .uri("/test-post")
            .body(Full::new(Bytes::from_static(b"{\"a\":1}")))
            .unwrap();
        let response = handle_request(req, Arc::clone(&h.state), None).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["receivedData"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_json_media_type_variants() {
        let h = harness(FakeTransport::accepting());
        for content_type in [
            "application/json; charset=utf-8",
            "Application/JSON",
            "application/merge-patch+json",
        ] {
            let (status, response) =
                call_typed(&h.state, Method::POST, "/test-post", content_type, r#"{"a":1}"#).await;
            assert_eq!(status, StatusCode::OK, "{content_type}");
            assert_eq!(json_body(response).await["receivedData"], serde_json::json!({"a": 1}));
        }
    }

    #[tokio::test]
    async fn test_scalar_json_is_server_error() {
        let h = harness(FakeTransport::accepting());
        for payload in ["5", "\"text\"", "null", "true"] {
            let (status, response) = call(&h.state, Method::POST, "/test-post", payload).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{payload}");
            let body = json_body(response).await;
            assert_eq!(body["success"], false);
            assert!(body["message"].as_str().unwrap().starts_with("Lỗi server: "));
        }

        let (status, response) = call(&h.state, Method::POST, "/test-post", "[1,2]").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(response).await["receivedData"], serde_json::json!([1, 2]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_body_times_out() {
        let h = harness(FakeTransport::accepting());
        let req = Request::builder()
            .method(Method::POST)
            .uri("/send-email")
            .header("content-type", "application/json")
            .body(StalledBody)
            .unwrap();

        let started = tokio::time::Instant::now();
        let response = handle_request(req, Arc::clone(&h.state), None).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(60_000));
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");

        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Lỗi server: Request body timeout");
        assert!(body["timestamp"].is_string());
        assert!(h.transport.sent.lock().unwrap().is_empty());
    }
}
