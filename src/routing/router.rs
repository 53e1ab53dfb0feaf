//! Request router.
//!
//! # Responsibilities
//! - Hold the ordered route table (method, anchored path regex, matchers)
//! - Reject malformed requests before any route is consulted
//! - Select the first matching route and run its handler
//! - Strip headers only the control plane may set
//!
//! # Design Decisions
//! - Table is built once at startup and never mutated while serving
//! - First match wins; registration order is the only priority
//! - No match is 403, not 404, so unknown targets leak nothing
//! - Handler panics are caught here so the request headers can be logged
//!   (redacted) next to the panic message

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::response::Response;
use futures_util::FutureExt;
use regex::Regex;
use thiserror::Error;

use crate::handler::BoxHandler;
use crate::http::request::RequestIdExt;
use crate::http::response::{self, ErrorFormat};
use crate::http::websocket::is_websocket_upgrade;
use crate::observability::metrics;
use crate::routing::matcher::Matcher;
use crate::security::headers;

/// Methods the proxy is willing to serve.
pub const ALLOWED_METHODS: [Method; 7] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

/// Errors building a route.
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("invalid method {0:?}")]
    InvalidMethod(String),

    #[error("invalid route pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Descriptive data attached to a route.
#[derive(Debug, Clone)]
pub struct RouteMeta {
    /// Identifier used in logs and metrics.
    pub id: String,
    /// Label of whatever serves the route (control plane, collaborator, ...).
    pub backend: String,
    /// Whether websocket upgrades may reach the handler.
    pub websocket: bool,
    /// Shape of errors the router itself produces for this route.
    pub format: ErrorFormat,
}

/// A single entry in the route table.
pub struct Route {
    method: Option<Method>,
    regex: Regex,
    matchers: Vec<Box<dyn Matcher>>,
    handler: BoxHandler,
    meta: RouteMeta,
}

impl Route {
    /// Build a route. An empty `method` matches any method; `pattern` is
    /// anchored at the start of the path if it is not already.
    pub fn new(method: &str, pattern: &str, handler: BoxHandler) -> Result<Self, RouteError> {
        let method = if method.is_empty() {
            None
        } else {
            Some(
                Method::from_bytes(method.as_bytes())
                    .map_err(|_| RouteError::InvalidMethod(method.to_string()))?,
            )
        };

        let anchored = if pattern.starts_with('^') {
            pattern.to_string()
        } else {
            format!("^{pattern}")
        };
        let regex = Regex::new(&anchored).map_err(|source| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            method,
            meta: RouteMeta {
                id: anchored,
                backend: "default".to_string(),
                websocket: false,
                format: ErrorFormat::Plain,
            },
            regex,
            matchers: Vec::new(),
            handler,
        })
    }

    pub fn with_matcher(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matchers.push(Box::new(matcher));
        self
    }

    pub fn with_matchers(mut self, matchers: Vec<Box<dyn Matcher>>) -> Self {
        self.matchers.extend(matchers);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.meta.id = id.into();
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.meta.backend = backend.into();
        self
    }

    pub fn with_format(mut self, format: ErrorFormat) -> Self {
        self.meta.format = format;
        self
    }

    /// Allow websocket upgrade requests through to the handler.
    pub fn websocket(mut self) -> Self {
        self.meta.websocket = true;
        self
    }

    pub fn meta(&self) -> &RouteMeta {
        &self.meta
    }

    /// True if method, path and every matcher agree.
    fn matches(&self, method: &Method, path: &str, req: &Request<Body>) -> bool {
        if let Some(expected) = &self.method {
            if expected != method {
                return false;
            }
        }
        self.regex.is_match(path) && self.matchers.iter().all(|m| m.matches(req))
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("regex", &self.regex.as_str())
            .field("matchers", &self.matchers)
            .field("meta", &self.meta)
            .finish()
    }
}

/// Ordered route table plus the URL prefix it is mounted under.
#[derive(Debug)]
pub struct Router {
    prefix: String,
    routes: Vec<Route>,
}

impl Router {
    /// Empty router serving paths under `url_prefix`.
    pub fn new(url_prefix: &str) -> Self {
        let trimmed = url_prefix.trim_matches('/');
        let prefix = if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{trimmed}/")
        };
        Self {
            prefix,
            routes: Vec::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Append a route. Earlier routes take priority.
    pub fn push(&mut self, route: Route) -> &mut Self {
        tracing::debug!(route = %route.meta.id, backend = %route.meta.backend, "Route registered");
        self.routes.push(route);
        self
    }

    /// Build and append a route.
    pub fn route(
        &mut self,
        method: &str,
        pattern: &str,
        handler: BoxHandler,
        matchers: Vec<Box<dyn Matcher>>,
    ) -> Result<&mut Self, RouteError> {
        let route = Route::new(method, pattern, handler)?.with_matchers(matchers);
        Ok(self.push(route))
    }

    /// Strip the URL prefix from a cleaned path, or `None` if it is outside.
    fn strip_prefix(&self, cleaned: &str) -> Option<String> {
        if cleaned.starts_with(&self.prefix) {
            Some(clean_path(&cleaned[self.prefix.len() - 1..]))
        } else if format!("{cleaned}/") == self.prefix {
            Some("/".to_string())
        } else {
            None
        }
    }

    fn find(&self, path: &str, req: &Request<Body>) -> Option<&Route> {
        self.routes
            .iter()
            .find(|route| route.matches(req.method(), path, req))
    }

    /// The route `req` would be dispatched to, if any.
    pub fn match_route(&self, req: &Request<Body>) -> Option<&Route> {
        let path = self.strip_prefix(&clean_path(req.uri().path()))?;
        self.find(&path, req)
    }

    /// Dispatch a request through the table.
    pub async fn serve(&self, mut req: Request<Body>) -> Response {
        let start = Instant::now();
        let method = req.method().clone();
        let request_id = req.request_id().unwrap_or("unknown").to_string();

        let (route_id, response) = match self.check(&req) {
            Err(rejection) => ("none".to_string(), rejection),
            Ok(path) => match self.find(&path, &req) {
                None => {
                    tracing::warn!(
                        request_id = %request_id,
                        method = %method,
                        path = %req.uri().path(),
                        "No route matched"
                    );
                    (
                        "none".to_string(),
                        response::text(StatusCode::FORBIDDEN, "Forbidden"),
                    )
                }
                Some(route) => {
                    let meta = &route.meta;
                    if !meta.websocket && is_websocket_upgrade(req.headers()) {
                        tracing::warn!(
                            request_id = %request_id,
                            route = %meta.id,
                            "Websocket upgrade on non-websocket route"
                        );
                        (
                            meta.id.clone(),
                            response::text(StatusCode::BAD_REQUEST, "Bad Request"),
                        )
                    } else {
                        headers::strip_blocked(req.headers_mut());
                        tracing::debug!(
                            request_id = %request_id,
                            method = %method,
                            path = %path,
                            route = %meta.id,
                            backend = %meta.backend,
                            "Route matched"
                        );
                        (meta.id.clone(), run_handler(route, req, &request_id).await)
                    }
                }
            },
        };

        metrics::record_request(method.as_str(), response.status().as_u16(), &route_id, start);
        tracing::info!(
            request_id = %request_id,
            method = %method,
            route = %route_id,
            status = response.status().as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
        response
    }

    /// Router-level validation. Returns the cleaned, prefix-stripped path.
    fn check(&self, req: &Request<Body>) -> Result<String, Response> {
        if req.method() == Method::CONNECT || req.uri().path() == "*" {
            return Err(response::text(StatusCode::BAD_REQUEST, "Bad Request"));
        }

        if !ALLOWED_METHODS.contains(req.method()) {
            let mut rejection = response::text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
            rejection.headers_mut().insert(
                header::ALLOW,
                HeaderValue::from_static("GET, HEAD, POST, PUT, PATCH, DELETE, OPTIONS"),
            );
            return Err(rejection);
        }

        let cleaned = clean_path(req.uri().path());
        self.strip_prefix(&cleaned)
            .ok_or_else(|| response::text(StatusCode::NOT_FOUND, "Not Found"))
    }
}

async fn run_handler(route: &Route, req: Request<Body>, request_id: &str) -> Response {
    let request_headers = req.headers().clone();
    let handler = Arc::clone(&route.handler);

    match AssertUnwindSafe(async move { handler(req).await })
        .catch_unwind()
        .await
    {
        Ok(response) => response,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(
                request_id = %request_id,
                route = %route.meta.id,
                panic = %message,
                headers = ?headers::redacted(&request_headers),
                "Handler panicked"
            );
            match route.meta.format {
                ErrorFormat::Plain => {
                    response::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                }
                ErrorFormat::Json => response::json_error(StatusCode::INTERNAL_SERVER_ERROR),
            }
        }
    }
}

/// Lexically clean an escaped URL path.
///
/// Repeated slashes collapse, `.` segments vanish and `..` segments pop their
/// parent without escaping the root. A trailing slash survives, except on
/// the root itself.
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut cleaned = String::with_capacity(path.len() + 1);
    for segment in &segments {
        cleaned.push('/');
        cleaned.push_str(segment);
    }
    if cleaned.is_empty() {
        return "/".to_string();
    }
    if path.ends_with('/') {
        cleaned.push('/');
    }
    cleaned
}
