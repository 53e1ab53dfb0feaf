//! `X-Sendfile` responses from the control plane.
//!
//! Proxied requests carry `X-Sendfile-Type: X-Sendfile`. A control-plane
//! response that names a local file in `X-Sendfile` is replaced by that
//! file; the header itself never reaches the client.
//!
//! ```text
//! no X-Sendfile        → response relayed unchanged
//! X-Sendfile: <path>   → body dropped, file streamed with the
//!                        control plane's other headers (404 if missing)
//! ```

use std::path::PathBuf;

use axum::body::Body;
use axum::http::{header, HeaderValue, Request};
use axum::response::Response;

use crate::error::ProxyError;
use crate::handler::{handler_fn, BoxHandler};
use crate::http::request::RequestIdExt;
use crate::http::response::ErrorFormat;
use crate::http::senddata::sendfile::{serve_file, SendFileParams};
use crate::http::senddata::DirectiveContext;
use crate::security::headers::{SENDFILE_HEADER, SENDFILE_TYPE_HEADER};

/// Wrap `inner` so `X-Sendfile` answers are served from disk.
pub fn intercept(inner: BoxHandler, development: bool, format: ErrorFormat) -> BoxHandler {
    handler_fn(move |mut req: Request<Body>| {
        let inner = inner.clone();
        async move {
            let request_id = req.request_id().unwrap_or("unknown").to_string();
            let method = req.method().clone();
            let uri = req.uri().clone();
            let request_headers = req.headers().clone();

            req.headers_mut()
                .insert(SENDFILE_TYPE_HEADER, HeaderValue::from_static("X-Sendfile"));
            let mut response = inner(req).await;

            let Some(value) = response.headers_mut().remove(SENDFILE_HEADER) else {
                return response;
            };
            let mut response_headers = std::mem::take(response.headers_mut());
            response_headers.remove(header::CONTENT_LENGTH);
            drop(response);

            let path = match value.to_str() {
                Ok(path) => PathBuf::from(path),
                Err(_) => {
                    return ProxyError::Protocol("X-Sendfile path is not valid text".into())
                        .into_response_for(development, format);
                }
            };
            tracing::debug!(request_id = %request_id, path = %path.display(), "X-Sendfile");

            let ctx = DirectiveContext {
                method,
                uri,
                request_headers,
                response_headers,
            };
            match serve_file(ctx, SendFileParams { path }).await {
                Ok(response) => response,
                Err(e) => e.into_response_for(development, format),
            }
        }
    })
}
