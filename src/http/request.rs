//! Request correlation.
//!
//! # Responsibilities
//! - Assign every inbound request an `X-Request-Id` (UUID v4) unless one
//!   is already present (the server drops client values unless
//!   propagation is enabled)
//! - Echo the ID on the response
//! - Expose the ID to handlers for logging
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Built from tower-http's set/propagate layers rather than a custom
//!   middleware

use axum::http::{HeaderName, Request};
use tower::Layer;
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestId, PropagateRequestIdLayer, SetRequestId,
    SetRequestIdLayer,
};

pub use tower_http::request_id::RequestId;

/// Correlation header name.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Layer that sets and propagates `X-Request-Id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = SetRequestId<PropagateRequestId<S>, MakeRequestUuid>;

    fn layer(&self, inner: S) -> Self::Service {
        let header = HeaderName::from_static(X_REQUEST_ID);
        let propagate = PropagateRequestIdLayer::new(header.clone()).layer(inner);
        SetRequestIdLayer::new(header, MakeRequestUuid).layer(propagate)
    }
}

/// Access to the request's correlation ID.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&str>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&str> {
        self.headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::response::Response;
    use tower::{service_fn, ServiceExt};

    async fn echo(req: Request<Body>) -> Result<Response, std::convert::Infallible> {
        let seen = req.request_id().unwrap_or_default().to_string();
        Ok(Response::new(Body::from(seen)))
    }

    #[tokio::test]
    async fn generates_and_echoes_id() {
        let svc = RequestIdLayer.layer(service_fn(echo));
        let response = svc.oneshot(Request::new(Body::empty())).await.unwrap();

        let echoed = response.headers()[X_REQUEST_ID].to_str().unwrap().to_string();
        assert!(uuid::Uuid::parse_str(&echoed).is_ok());
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], echoed.as_bytes());
    }

    #[tokio::test]
    async fn keeps_client_id() {
        let svc = RequestIdLayer.layer(service_fn(echo));
        let req = Request::builder()
            .header(X_REQUEST_ID, "abc-123")
            .body(Body::empty())
            .unwrap();
        let response = svc.oneshot(req).await.unwrap();
        assert_eq!(response.headers()[X_REQUEST_ID], "abc-123");
    }
}
