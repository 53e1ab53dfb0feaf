//! Route matching conditions.
//!
//! # Responsibilities
//! - Extra per-route conditions beyond method and path
//! - Content-Type matching on the media type
//! - Websocket upgrade detection
//!
//! # Design Decisions
//! - A route holds an ordered list of matchers evaluated with AND semantics
//! - Matchers only look at the request head; bodies are never read

use std::fmt;

use axum::body::Body;
use axum::http::{header, Request};

use crate::http::websocket::is_websocket_upgrade;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &Request<Body>) -> bool;
}

/// Media type of the request without parameters, lowercased.
pub(crate) fn media_type(req: &Request<Body>) -> Option<String> {
    let value = req.headers().get(header::CONTENT_TYPE)?.to_str().ok()?;
    let essence = value.split(';').next().unwrap_or_default().trim();
    Some(essence.to_ascii_lowercase())
}

/// Matches the request's `Content-Type`.
///
/// Only the media type is compared, ignoring case; parameters such as
/// `charset` are dropped.
#[derive(Debug, Clone)]
pub struct ContentTypeMatcher {
    media_type: String,
}

impl ContentTypeMatcher {
    pub fn exact(media_type: &str) -> Self {
        Self {
            media_type: media_type.to_ascii_lowercase(),
        }
    }
}

impl Matcher for ContentTypeMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        media_type(req).is_some_and(|mt| mt == self.media_type)
    }
}

/// Matches websocket upgrade requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebsocketUpgradeMatcher;

impl Matcher for WebsocketUpgradeMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        is_websocket_upgrade(req.headers())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_header(name: &str, value: &str) -> Request<Body> {
        Request::builder()
            .header(name, value)
            .body(Body::default())
            .unwrap()
    }

    #[test]
    fn content_type_ignores_parameters_and_case() {
        let matcher = ContentTypeMatcher::exact("application/x-git-upload-pack-request");
        assert!(matcher.matches(&with_header(
            "Content-Type",
            "Application/X-Git-Upload-Pack-Request; charset=utf-8"
        )));
        assert!(!matcher.matches(&with_header("Content-Type", "text/plain")));
        assert!(!matcher.matches(&Request::new(Body::empty())));
    }

    #[test]
    fn websocket_matcher() {
        let req = Request::builder()
            .header("Connection", "keep-alive, Upgrade")
            .header("Upgrade", "websocket")
            .body(Body::default())
            .unwrap();
        assert!(WebsocketUpgradeMatcher.matches(&req));
        assert!(!WebsocketUpgradeMatcher.matches(&Request::new(Body::empty())));
    }
}
