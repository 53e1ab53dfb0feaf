//! Timeout enforcement for calls to the control plane.
//!
//! # Design Decisions
//! - Every outbound call has a deadline for its response headers
//! - The body is not covered: streamed bodies may legitimately be slow
//! - Timeouts surface as [`ProxyError::Timeout`], distinct from dial errors

use std::future::Future;
use std::time::Duration;

use crate::error::ProxyError;

/// Await `fut`, failing with [`ProxyError::Timeout`] after `limit`.
pub async fn response_headers_within<F, T>(limit: Duration, fut: F) -> Result<T, ProxyError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ProxyError::Timeout(limit))
}
