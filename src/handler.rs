//! Handler types shared by the routing table and the handler chain.
//!
//! Handlers are type-erased async functions so that routes, queue wrappers,
//! the pre-authorizer and plugged-in collaborators compose freely.

use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

/// JSON object returned by a trusted pre-authorization response.
///
/// The schema belongs to whichever collaborator consumes it.
pub type Envelope = Map<String, Value>;

/// A request handler: request in, response out.
pub type BoxHandler = Arc<dyn Fn(Request<Body>) -> BoxFuture<'static, Response> + Send + Sync>;

/// Handler invoked after a successful pre-authorization.
pub type EnvelopeHandler =
    Arc<dyn Fn(Request<Body>, Envelope) -> BoxFuture<'static, Response> + Send + Sync>;

/// Wrap an async function as a [`BoxHandler`].
pub fn handler_fn<F, Fut>(f: F) -> BoxHandler
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)))
}

/// Wrap an async function as an [`EnvelopeHandler`].
pub fn envelope_handler_fn<F, Fut>(f: F) -> EnvelopeHandler
where
    F: Fn(Request<Body>, Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |req, envelope| Box::pin(f(req, envelope)))
}
