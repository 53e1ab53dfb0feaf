//! Directive dispatch ("SendData").
//!
//! # Responsibilities
//! - Watch control-plane responses for the `X-Proxy-Send-Data` header
//! - Decode `<prefix>:<base64url(JSON)>` into the directive's parameters
//! - Let the matching directive produce the response instead
//!
//! # Data Flow
//! ```text
//! request ─▶ inner handler ─▶ response head
//!                                 │
//!              no directive header ├──▶ streamed to client unchanged
//!                                 │
//!              known prefix        ├──▶ header stripped, body dropped,
//!                                 │    directive serves the request
//!              unknown / garbled   └──▶ 500
//! ```
//!
//! # Design Decisions
//! - Directives are typed: each declares its parameter struct and the
//!   registry erases it once at registration time
//! - Registration order decides ties; exactly one directive runs
//! - The directive header never reaches the client

pub mod sendfile;
pub mod sendurl;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, Uri};
use axum::response::Response;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;

use crate::error::{ProxyError, ProxyResult};
use crate::handler::{handler_fn, BoxHandler};
use crate::http::request::RequestIdExt;
use crate::http::response::ErrorFormat;
use crate::security::headers::SEND_DATA_HEADER;

pub use sendfile::SendFile;
pub use sendurl::SendUrl;

/// URL-safe base64, padding optional.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// What a directive knows about the exchange it takes over.
#[derive(Debug, Clone)]
pub struct DirectiveContext {
    /// Inbound request method.
    pub method: Method,
    /// Inbound request URI.
    pub uri: Uri,
    /// Inbound request headers (after the router's block-list).
    pub request_headers: HeaderMap,
    /// Headers of the control-plane response carrying the directive,
    /// without the directive itself and without `Content-Length`.
    pub response_headers: HeaderMap,
}

/// A response the control plane can ask the proxy to produce.
pub trait Directive: Send + Sync + 'static {
    /// Decoded JSON payload.
    type Params: DeserializeOwned + Send + 'static;

    /// Text before the `:` in the directive header.
    fn prefix(&self) -> &'static str;

    fn serve(&self, ctx: DirectiveContext, params: Self::Params)
        -> BoxFuture<'static, ProxyResult<Response>>;
}

trait ErasedDirective: Send + Sync {
    fn prefix(&self) -> &'static str;

    fn dispatch(
        &self,
        ctx: DirectiveContext,
        payload: &[u8],
    ) -> ProxyResult<BoxFuture<'static, ProxyResult<Response>>>;
}

impl<D: Directive> ErasedDirective for D {
    fn prefix(&self) -> &'static str {
        Directive::prefix(self)
    }

    fn dispatch(
        &self,
        ctx: DirectiveContext,
        payload: &[u8],
    ) -> ProxyResult<BoxFuture<'static, ProxyResult<Response>>> {
        let params: D::Params = serde_json::from_slice(payload).map_err(|e| {
            ProxyError::Protocol(format!("{}: decode parameters: {e}", Directive::prefix(self)))
        })?;
        Ok(self.serve(ctx, params))
    }
}

/// Decode a directive header value into `(prefix, JSON bytes)`.
pub fn decode_header(value: &str) -> ProxyResult<(&str, Vec<u8>)> {
    let (prefix, encoded) = value
        .split_once(':')
        .ok_or_else(|| ProxyError::Protocol(format!("malformed directive {value:?}")))?;
    let payload = PAYLOAD_ENGINE
        .decode(encoded.trim())
        .map_err(|e| ProxyError::Protocol(format!("{prefix}: decode payload: {e}")))?;
    Ok((prefix, payload))
}

/// Encode a directive header value. Used by tests and embedding control planes.
pub fn encode_header(prefix: &str, params: &serde_json::Value) -> String {
    format!("{prefix}:{}", PAYLOAD_ENGINE.encode(params.to_string()))
}

/// Wraps a handler so its responses may carry directives.
#[derive(Clone)]
pub struct SendData {
    inner: BoxHandler,
    directives: Vec<Arc<dyn ErasedDirective>>,
    development: bool,
    format: ErrorFormat,
}

impl SendData {
    pub fn new(inner: BoxHandler) -> Self {
        Self {
            inner,
            directives: Vec::new(),
            development: false,
            format: ErrorFormat::Plain,
        }
    }

    /// Register a directive. Earlier registrations win on equal prefixes.
    pub fn with<D: Directive>(mut self, directive: D) -> Self {
        self.directives.push(Arc::new(directive));
        self
    }

    /// Show error details to clients.
    pub fn development(mut self, development: bool) -> Self {
        self.development = development;
        self
    }

    pub fn format(mut self, format: ErrorFormat) -> Self {
        self.format = format;
        self
    }

    pub fn into_handler(self) -> BoxHandler {
        let send_data = Arc::new(self);
        handler_fn(move |req| {
            let send_data = Arc::clone(&send_data);
            async move { send_data.serve(req).await }
        })
    }

    async fn serve(&self, req: Request<Body>) -> Response {
        let request_id = req.request_id().unwrap_or("unknown").to_string();
        let method = req.method().clone();
        let uri = req.uri().clone();
        let request_headers = req.headers().clone();

        let mut response = (self.inner)(req).await;
        let Some(value) = response.headers_mut().remove(SEND_DATA_HEADER) else {
            return response;
        };

        let mut response_headers = std::mem::take(response.headers_mut());
        response_headers.remove(header::CONTENT_LENGTH);
        // The control plane's body is replaced by the directive's.
        drop(response);

        let ctx = DirectiveContext {
            method,
            uri,
            request_headers,
            response_headers,
        };
        match self.dispatch(ctx, value.to_str().unwrap_or_default()).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(request_id = %request_id, "Directive failed");
                e.into_response_for(self.development, self.format)
            }
        }
    }

    async fn dispatch(&self, ctx: DirectiveContext, value: &str) -> ProxyResult<Response> {
        let (prefix, payload) = decode_header(value)?;
        let directive = self
            .directives
            .iter()
            .find(|d| d.prefix() == prefix)
            .ok_or_else(|| ProxyError::Protocol(format!("unknown directive {prefix:?}")))?;

        tracing::debug!(directive = prefix, uri = %ctx.uri, "Serving directive");
        directive.dispatch(ctx, &payload)?.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::http::{HeaderValue, StatusCode};
    use serde::Deserialize;

    use crate::http::response;

    #[derive(Deserialize)]
    struct ArtParams {
        #[serde(rename = "Name", default)]
        name: String,
    }

    struct Art {
        calls: Arc<AtomicUsize>,
    }

    impl Directive for Art {
        type Params = ArtParams;

        fn prefix(&self) -> &'static str {
            "art"
        }

        fn serve(
            &self,
            _ctx: DirectiveContext,
            params: ArtParams,
        ) -> BoxFuture<'static, ProxyResult<Response>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                Ok(response::text(StatusCode::OK, &format!("art {}", params.name)))
            })
        }
    }

    fn upstream_with(directive: Option<&'static str>) -> BoxHandler {
        handler_fn(move |_req: Request<Body>| async move {
            let mut response = response::text(StatusCode::OK, "from control plane");
            if let Some(value) = directive {
                response
                    .headers_mut()
                    .insert(SEND_DATA_HEADER, HeaderValue::from_static(value));
            }
            response
        })
    }

    fn leak(value: String) -> &'static str {
        Box::leak(value.into_boxed_str())
    }

    async fn run(handler: BoxHandler) -> (StatusCode, HeaderMap, String) {
        let response = handler(Request::new(Body::empty())).await;
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn directive_replaces_response_and_header_is_hidden() {
        let calls = Arc::new(AtomicUsize::new(0));
        let value = leak(encode_header("art", &serde_json::json!({})));
        let handler = SendData::new(upstream_with(Some(value)))
            .with(Art { calls: calls.clone() })
            .into_handler();

        let (status, headers, body) = run(handler).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!headers.contains_key(SEND_DATA_HEADER));
        assert_eq!(body, "art \n");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_directive_passes_through() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = SendData::new(upstream_with(None))
            .with(Art { calls: calls.clone() })
            .into_handler();

        let (status, _, body) = run(handler).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "from control plane\n");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_prefix_is_500() {
        let value = leak(encode_header("zip", &serde_json::json!({})));
        let handler = SendData::new(upstream_with(Some(value)))
            .with(Art { calls: Arc::new(AtomicUsize::new(0)) })
            .into_handler();

        let (status, headers, body) = run(handler).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!headers.contains_key(SEND_DATA_HEADER));
        assert!(!body.contains("control plane"));
    }

    #[tokio::test]
    async fn garbled_payload_is_500() {
        let handler = SendData::new(upstream_with(Some("art:!!!not-base64!!!")))
            .with(Art { calls: Arc::new(AtomicUsize::new(0)) })
            .into_handler();
        assert_eq!(run(handler).await.0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn padding_is_optional() {
        // base64url("{}") is "e30" unpadded, "e30=" padded.
        assert_eq!(decode_header("art:e30").unwrap(), ("art", b"{}".to_vec()));
        assert_eq!(decode_header("art:e30=").unwrap(), ("art", b"{}".to_vec()));
        assert!(decode_header("no-colon").is_err());
    }

    #[test]
    fn params_are_typed() {
        let value = encode_header("art", &serde_json::json!({"Name": "logo"}));
        let (_, payload) = decode_header(&value).unwrap();
        let params: ArtParams = serde_json::from_slice(&payload).unwrap();
        assert_eq!(params.name, "logo");
    }
}
