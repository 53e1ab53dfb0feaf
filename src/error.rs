//! Errors surfaced by request handlers.
//!
//! Every handler in the chain ends in a [`Response`]; errors that reach the
//! top of a handler are converted with [`ProxyError::into_response_for`],
//! which decides how much detail the client gets.

use std::time::Duration;

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use thiserror::Error;

use crate::http::response::{self, ErrorFormat};

/// Errors that can occur while serving a request.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// The control plane could not be reached (maps to 502).
    #[error("control plane unreachable: {0}")]
    BadGateway(String),

    /// The control plane did not send response headers in time (maps to 502).
    #[error("control plane did not respond within {0:?}")]
    Timeout(Duration),

    /// The control plane answered with something it must never send
    /// (malformed envelope, unregistered directive, leaked envelope type).
    #[error("control plane protocol violation: {0}")]
    Protocol(String),

    /// The outbound target could not be built from the inbound request.
    #[error("invalid upstream target: {0}")]
    InvalidTarget(String),

    /// The client went away while its request was being served.
    #[error("client aborted the request")]
    ClientAborted,

    /// A bug in a handler. Logged, reported and turned into a 500.
    #[error("handler fault: {0}")]
    HandlerFault(String),
}

impl ProxyError {
    /// HTTP status the client receives for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::BadGateway(_) | ProxyError::Timeout(_) => StatusCode::BAD_GATEWAY,
            ProxyError::ClientAborted => StatusCode::BAD_REQUEST,
            ProxyError::Protocol(_)
            | ProxyError::InvalidTarget(_)
            | ProxyError::HandlerFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert into a client response.
    ///
    /// In development mode the error text is sent to the client; otherwise
    /// only the canonical status reason is. A client abort produces a body
    /// that fails on first poll so the connection is torn down instead of
    /// answered.
    pub fn into_response_for(self, development: bool, format: ErrorFormat) -> Response {
        let status = self.status();
        match &self {
            ProxyError::ClientAborted => {
                tracing::debug!("client aborted request, dropping connection");
                return aborted_response();
            }
            ProxyError::BadGateway(_) | ProxyError::Timeout(_) => {
                tracing::error!(error = %self, "bad gateway");
            }
            ProxyError::Protocol(_) => {
                tracing::error!(error = %self, "control plane bug");
            }
            ProxyError::InvalidTarget(_) | ProxyError::HandlerFault(_) => {
                tracing::error!(error = %self, "internal error");
            }
        }

        if development {
            return response::text(status, &self.to_string());
        }
        match format {
            ErrorFormat::Plain => response::text(status, response::reason(status)),
            ErrorFormat::Json => response::json_error(status),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        self.into_response_for(false, ErrorFormat::Plain)
    }
}

fn aborted_response() -> Response {
    let stream = futures_util::stream::once(async {
        Err::<Bytes, _>(std::io::Error::new(
            std::io::ErrorKind::ConnectionAborted,
            "client aborted",
        ))
    });
    Response::new(Body::from_stream(stream))
}

/// Result type alias for handler operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(ProxyError::BadGateway("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ProxyError::Timeout(Duration::from_secs(1)).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ProxyError::Protocol("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ProxyError::HandlerFault("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn production_hides_details() {
        let res = ProxyError::BadGateway("dial tcp 10.0.0.1:8080: refused".into())
            .into_response_for(false, ErrorFormat::Plain);
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        let body = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Bad Gateway\n");
    }

    #[tokio::test]
    async fn development_shows_details() {
        let res = ProxyError::BadGateway("dial tcp 10.0.0.1:8080: refused".into())
            .into_response_for(true, ErrorFormat::Json);
        let body = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("10.0.0.1:8080"));
    }

    #[tokio::test]
    async fn client_abort_body_fails() {
        let res = ProxyError::ClientAborted.into_response_for(false, ErrorFormat::Plain);
        assert!(axum::body::to_bytes(res.into_body(), 1024).await.is_err());
    }
}
