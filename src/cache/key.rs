//! Cache key derivation.

use std::fmt;

use axum::http::{header::HOST, Method, Request, Uri};
use sha2::{Digest, Sha256};

/// Identifies a cacheable request: SHA-256 over `METHOD:host:url`.
///
/// Headers and body never take part, so two requests differing only in
/// headers share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a method, upstream host and full request URL.
    pub fn new(method: &Method, host: &str, uri: &Uri) -> Self {
        Self::from_preimage(&format!("{}:{}:{}", method, host, uri))
    }

    /// Key for an already rewritten request. The host is the URI authority,
    /// falling back to the `Host` header when the URI is relative.
    pub fn from_request<B>(req: &Request<B>) -> Self {
        let host = req
            .uri()
            .authority()
            .map(|a| a.as_str())
            .or_else(|| req.headers().get(HOST).and_then(|v| v.to_str().ok()))
            .unwrap_or("");
        Self::new(req.method(), host, req.uri())
    }

    fn from_preimage(preimage: &str) -> Self {
        Self(hex::encode(Sha256::digest(preimage.as_bytes())))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
