//! Response construction helpers.
//!
//! # Responsibilities
//! - Plain-text and JSON error bodies
//! - Relay upstream responses to the client without hop-by-hop headers
//!
//! # Design Decisions
//! - Error bodies carry only the canonical reason unless in development mode
//! - Health endpoints pick their own error format (plain or JSON)
//! - Upstream bodies are streamed, never buffered

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use hyper::body::Incoming;

use crate::security::headers::strip_hop_by_hop;

/// Shape of error bodies produced for a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorFormat {
    /// `text/plain` body with the reason phrase.
    #[default]
    Plain,
    /// `{"error": "...", "status": N}` JSON body.
    Json,
}

/// Canonical reason phrase for a status.
pub fn reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown Status")
}

/// Plain-text response; a trailing newline is appended to the message.
pub fn text(status: StatusCode, message: &str) -> Response {
    let mut response = Response::new(Body::from(format!("{}\n", message)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

/// JSON error response used by the readiness and liveness endpoints.
pub fn json_error(status: StatusCode) -> Response {
    let body = serde_json::json!({
        "error": reason(status),
        "status": status.as_u16(),
    });
    let mut response = Response::new(Body::from(format!("{}\n", body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    response
}

/// Turn an upstream response into a client response, streaming the body.
pub fn relay(response: hyper::Response<Incoming>) -> Response {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}
