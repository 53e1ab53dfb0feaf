//! Pre-authorization with the control plane.
//!
//! Before a privileged handler runs, the head of the inbound request is
//! replayed to the control plane (without its body) together with a signed
//! token. The control plane either:
//!
//! ```text
//! non-200                          → relayed to the client untouched
//! 200 + trusted content type       → body decoded as an Envelope,
//!                                    success handler runs
//! 200 + anything else              → not meant for us; relayed untouched
//! ```
//!
//! The content type is checked before the body is parsed. Coarse route
//! patterns regularly catch requests the control plane answers itself, and
//! only the trusted content type marks an answer addressed to the proxy.

use std::sync::Arc;

use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::response::Response;
use http_body_util::{BodyExt, Limited};

use crate::error::{ProxyError, ProxyResult};
use crate::handler::{handler_fn, BoxHandler, Envelope, EnvelopeHandler};
use crate::http::request::RequestIdExt;
use crate::http::response::{self, ErrorFormat};
use crate::http::upstream::Upstream;
use crate::security::headers::API_REQUEST_HEADER;
use crate::security::token::Claims;
use crate::security::SecretProvider;

/// Content type marking a response as a pre-authorization envelope.
pub const RESPONSE_CONTENT_TYPE: &str = "application/vnd.accel-proxy+json";

/// Largest envelope the proxy will decode.
const MAX_ENVELOPE_BYTES: usize = 10 * 1024 * 1024;

/// True if `Content-Type` is exactly the trusted envelope type.
pub fn is_trusted_response(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .is_some_and(|v| v.as_bytes() == RESPONSE_CONTENT_TYPE.as_bytes())
}

/// Outcome of a pre-authorization call.
#[derive(Debug)]
pub enum Decision {
    /// Send this response to the client as-is.
    Relay(Response),
    /// Authorized; hand the envelope to the success handler.
    Authorized(Envelope),
}

/// Signs and sends pre-authorization requests.
#[derive(Debug, Clone)]
pub struct PreAuthorizer {
    upstream: Upstream,
    secret: Arc<SecretProvider>,
}

impl PreAuthorizer {
    pub fn new(upstream: Upstream, secret: Arc<SecretProvider>) -> Self {
        Self { upstream, secret }
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    /// Ask the control plane about the request described by `parts`.
    pub async fn authorize(&self, parts: &Parts, suffix: &str) -> ProxyResult<Decision> {
        let mut outbound = self.upstream.outbound(parts, suffix, Body::empty())?;
        outbound.headers_mut().remove(header::CONTENT_LENGTH);

        let token = self
            .secret
            .signed_token(Claims::new())
            .map_err(|e| ProxyError::HandlerFault(format!("sign pre-authorization token: {e}")))?;
        let token = HeaderValue::from_str(&token)
            .map_err(|e| ProxyError::HandlerFault(format!("token header: {e}")))?;
        outbound.headers_mut().insert(API_REQUEST_HEADER, token);

        let upstream_response = self.upstream.send(outbound).await?;

        if upstream_response.status() != StatusCode::OK {
            tracing::debug!(
                path = %parts.uri.path(),
                status = upstream_response.status().as_u16(),
                "Pre-authorization refused"
            );
            return Ok(Decision::Relay(response::relay(upstream_response)));
        }

        if !is_trusted_response(upstream_response.headers()) {
            // The route matched a request the control plane handles itself.
            return Ok(Decision::Relay(response::relay(upstream_response)));
        }

        let body = Limited::new(upstream_response.into_body(), MAX_ENVELOPE_BYTES)
            .collect()
            .await
            .map_err(|e| ProxyError::BadGateway(format!("read pre-authorization response: {e}")))?
            .to_bytes();

        let envelope: Envelope = serde_json::from_slice(&body).map_err(|e| {
            ProxyError::Protocol(format!("decode pre-authorization response: {e}"))
        })?;
        Ok(Decision::Authorized(envelope))
    }

    /// Handler that pre-authorizes against `path + suffix` and then runs
    /// `success` with the original request and the decoded envelope.
    pub fn handler(&self, success: EnvelopeHandler, suffix: &str) -> BoxHandler {
        let preauth = Arc::new(self.clone());
        let suffix: Arc<str> = Arc::from(suffix);

        handler_fn(move |req: Request<Body>| {
            let preauth = Arc::clone(&preauth);
            let success = Arc::clone(&success);
            let suffix = Arc::clone(&suffix);
            async move {
                let request_id = req.request_id().unwrap_or("unknown").to_string();
                let (parts, body) = req.into_parts();
                match preauth.authorize(&parts, &suffix).await {
                    Ok(Decision::Authorized(envelope)) => {
                        tracing::debug!(request_id = %request_id, "Pre-authorization granted");
                        success(Request::from_parts(parts, body), envelope).await
                    }
                    Ok(Decision::Relay(response)) => response,
                    Err(e) => {
                        tracing::warn!(
                            request_id = %request_id,
                            path = %parts.uri.path(),
                            "Pre-authorization failed"
                        );
                        e.into_response_for(preauth.upstream.development(), ErrorFormat::Plain)
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_content_type(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn trusted_type_must_match_exactly() {
        assert!(is_trusted_response(&with_content_type(RESPONSE_CONTENT_TYPE)));
        assert!(!is_trusted_response(&with_content_type(
            "application/vnd.accel-proxy+json; charset=utf-8"
        )));
        assert!(!is_trusted_response(&with_content_type("application/json")));
        assert!(!is_trusted_response(&HeaderMap::new()));
    }
}
