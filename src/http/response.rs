//! HTTP response building module
//!
//! Every reply of the relay is JSON except the pre-flight answer; all of them
//! carry the same CORS headers.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE, SERVER};
use hyper::{Response, StatusCode};
use serde::Serialize;

pub type HttpResponse = Response<Full<Bytes>>;

/// Headers attached to every response, pre-flight included
pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("access-control-allow-origin", "*"),
    ("access-control-allow-headers", "Content-Type, Authorization"),
    ("access-control-allow-methods", "GET, POST, OPTIONS, PUT, DELETE"),
];

/// ISO-8601 UTC timestamp with milliseconds, e.g. `2024-05-01T10:00:00.000Z`
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Build JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    let json = match serde_json::to_vec(body) {
        Ok(j) => j,
        Err(e) => {
            log_build_error("JSON", &e);
            return Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .header(CONTENT_TYPE, "application/json; charset=utf-8")
                .body(Full::new(Bytes::from_static(
                    br#"{"success":false,"message":"Internal server error"}"#,
                )))
                .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())));
        }
    };

    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json; charset=utf-8")
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_else(|e| {
            log_build_error(status.as_str(), &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Build OPTIONS response (preflight request)
pub fn build_options_response() -> HttpResponse {
    Response::builder()
        .status(StatusCode::OK)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|e| {
            log_build_error("OPTIONS", &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Attach CORS and `Server` headers; HEAD requests lose their body
pub fn finalize(mut response: HttpResponse, server_name: &str, is_head: bool) -> HttpResponse {
    let headers = response.headers_mut();
    for (name, value) in CORS_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    if let Ok(value) = HeaderValue::from_str(server_name) {
        headers.insert(SERVER, value);
    }

    if is_head {
        let (parts, _) = response.into_parts();
        return Response::from_parts(parts, Full::new(Bytes::new()));
    }
    response
}

/// Log response build error
fn log_build_error(status: &str, error: &dyn std::fmt::Display) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_format() {
        let ts = timestamp();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn test_finalize_adds_cors() {
        let response = finalize(build_options_response(), "test/1.0", false);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            HeaderValue::from_static("*")
        );
        assert_eq!(
            response.headers()["access-control-allow-methods"],
            HeaderValue::from_static("GET, POST, OPTIONS, PUT, DELETE")
        );
        assert_eq!(response.headers()["server"], HeaderValue::from_static("test/1.0"));
    }

    #[test]
    fn test_json_response_content_type() {
        let response = json_response(StatusCode::BAD_REQUEST, &serde_json::json!({"success": false}));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            HeaderValue::from_static("application/json; charset=utf-8")
        );
    }
}
