//! Hop-by-hop header hygiene.
//!
//! # Responsibilities
//! - Strip connection-scoped headers before a message crosses the proxy
//! - Strip every extra header the `Connection` header names
//!
//! # Design Decisions
//! - Applied to the outbound request and to the upstream response before it
//!   is frozen, so cached snapshots never replay connection state
//! - Proxy credentials are connection-scoped and never reach the upstream

use axum::http::{
    header::{CONNECTION, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING, UPGRADE},
    HeaderMap, HeaderName,
};

/// Headers that only describe a single connection.
static HOP_BY_HOP_HEADERS: [HeaderName; 9] = [
    CONNECTION,
    HeaderName::from_static("proxy-connection"),
    HeaderName::from_static("keep-alive"),
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
];

/// Remove hop-by-hop headers, including the ones listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in &HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}
