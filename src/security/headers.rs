//! Header manipulation.
//!
//! # Responsibilities
//! - Name the headers exchanged with the control plane
//! - Strip client-forgeable signal headers from inbound requests
//! - Strip hop-by-hop headers when relaying
//! - Redact credentials before headers are logged
//!
//! # Design Decisions
//! - Never trust signal headers arriving from clients; the block-list is
//!   applied before any handler runs

use axum::http::{header, HeaderMap, HeaderName};

/// Proxy version, attached to every request sent to the control plane.
pub const VERSION_HEADER: &str = "x-proxy-version";

/// Signed token proving a request was sent by this proxy.
pub const API_REQUEST_HEADER: &str = "x-proxy-api-request";

/// Directive header set by the control plane on its responses.
pub const SEND_DATA_HEADER: &str = "x-proxy-send-data";

/// Local file path the control plane wants served in its place.
pub const SENDFILE_HEADER: &str = "x-sendfile";

/// Advertises `X-Sendfile` support on proxied requests.
pub const SENDFILE_TYPE_HEADER: &str = "x-sendfile-type";

/// Headers clients must never be able to smuggle through to a handler.
pub const INBOUND_BLOCK_LIST: &[&str] = &[
    SEND_DATA_HEADER,
    SENDFILE_HEADER,
    SENDFILE_TYPE_HEADER,
    API_REQUEST_HEADER,
    VERSION_HEADER,
];

const HOP_BY_HOP: &[HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

const SENSITIVE: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "proxy-authorization",
    "private-token",
    "job-token",
    API_REQUEST_HEADER,
];

/// Remove the inbound block-list from a request's headers.
pub fn strip_blocked(headers: &mut HeaderMap) {
    for name in INBOUND_BLOCK_LIST {
        headers.remove(*name);
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .collect();
    for name in listed {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Render headers for logging with credentials masked.
pub fn redacted(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if SENSITIVE.contains(&name.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[binary]").to_string()
            };
            (name.as_str().to_string(), value)
        })
        .collect()
}
