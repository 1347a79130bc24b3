//! Caching transport: the proxy's request pipeline.
//!
//! # Responsibilities
//! - Derive the cache key of a rewritten request
//! - Serve fresh stored snapshots (`X-Cache: hit`)
//! - On a miss, fetch upstream, drop hop-by-hop and CORS headers, buffer and
//!   store (`X-Cache: miss`)
//!
//! # Design Decisions
//! - Storing is a side computation over the buffered body; its failures are
//!   logged, never returned to the client
//! - A corrupt stored entry fails the request (fail closed)
//! - No stampede suppression: concurrent misses each fetch, last store wins

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderValue, Request, Response, StatusCode};

use crate::cache::{strip_cors_headers, BufferedResponse, CacheKey, CacheStore, CachedResponse};
use crate::config::CacheConfig;
use crate::error::ProxyError;
use crate::http::headers::strip_hop_by_hop;
use crate::observability::metrics;
use crate::upstream::Upstream;

/// Response header reporting whether the cache answered.
pub const X_CACHE: &str = "x-cache";

/// What gets stored, and for how long.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub ttl: Duration,
    /// Only store `200 OK` responses.
    pub only_ok: bool,
}

impl From<&CacheConfig> for CachePolicy {
    fn from(config: &CacheConfig) -> Self {
        Self {
            ttl: config.ttl(),
            only_ok: config.only_ok,
        }
    }
}

/// Owns the cache store and the upstream, and answers proxied requests.
pub struct CachingTransport {
    store: CacheStore,
    upstream: Arc<dyn Upstream>,
    policy: CachePolicy,
}

impl CachingTransport {
    pub fn new(store: CacheStore, upstream: Arc<dyn Upstream>, policy: CachePolicy) -> Self {
        Self {
            store,
            upstream,
            policy,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Answer a rewritten request from the cache or the upstream.
    pub async fn fetch(&self, request: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let key = CacheKey::from_request(&request);

        if let Some(bytes) = self.store.get(&key) {
            metrics::record_cache_lookup(true);
            let mut response = CachedResponse::decode(&bytes)
                .and_then(|cached| cached.thaw())
                .map_err(|e| {
                    metrics::record_codec_error("decode");
                    tracing::error!(key = %key, error = %e, "Stored response is unreadable");
                    e
                })?;
            tracing::debug!(key = %key, uri = %request.uri(), "Cache hit");
            response.headers_mut().insert(X_CACHE, HeaderValue::from_static("hit"));
            return Ok(response);
        }
        metrics::record_cache_lookup(false);

        let uri = request.uri().clone();
        let mut response = self.upstream.fetch(request).await.map_err(|e| {
            metrics::record_upstream_error();
            tracing::error!(uri = %uri, error = %e, "Upstream fetch failed");
            e
        })?;
        strip_hop_by_hop(response.headers_mut());
        strip_cors_headers(response.headers_mut());

        if self.policy.only_ok && response.status() != StatusCode::OK {
            tracing::debug!(key = %key, status = %response.status(), "Not caching non-200 response");
            response.headers_mut().insert(X_CACHE, HeaderValue::from_static("miss"));
            return Ok(response);
        }

        let buffered = BufferedResponse::read(response)
            .await
            .map_err(ProxyError::Body)?;
        self.store_snapshot(key, &buffered);

        let mut response = buffered.into_response();
        response.headers_mut().insert(X_CACHE, HeaderValue::from_static("miss"));
        Ok(response)
    }

    fn store_snapshot(&self, key: CacheKey, buffered: &BufferedResponse) {
        if buffered.body.is_empty() {
            tracing::debug!(key = %key, "Not caching empty body");
            return;
        }

        match CachedResponse::freeze(buffered).encode() {
            Ok(bytes) => {
                tracing::debug!(key = %key, size = bytes.len(), ttl = ?self.policy.ttl, "Cached response");
                self.store.set(key, bytes, self.policy.ttl);
            }
            Err(e) => {
                metrics::record_codec_error("encode");
                tracing::warn!(key = %key, error = %e, "Failed to encode response, serving uncached");
            }
        }
    }
}
