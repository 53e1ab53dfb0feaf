//! WebSocket upgrade detection.
//!
//! # Responsibilities
//! - Detect WebSocket upgrade requests from their headers
//!
//! # Design Decisions
//! - The proxy never terminates websockets itself; upgrade requests are only
//!   allowed on routes flagged as websocket routes, whose collaborator owns
//!   the connection
//! - `Connection` is a token list, so `keep-alive, Upgrade` counts

use axum::http::{header, HeaderMap};

/// True if the headers ask for an upgrade to the websocket protocol.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    let upgrade_websocket = headers
        .get_all(header::UPGRADE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.trim().eq_ignore_ascii_case("websocket"));

    connection_upgrade && upgrade_websocket
}
