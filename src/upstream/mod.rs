//! Outbound fetch capability.
//!
//! # Data Flow
//! ```text
//! Rewritten request (absolute URI)
//!     → Upstream::fetch
//!     → client.rs (reqwest, TLS, connect/request timeouts)
//!     → upstream response, or a transport error
//! ```
//!
//! # Design Decisions
//! - The proxy core only sees the `Upstream` trait; tests plug in fakes
//! - No retries here or anywhere in the core
//! - Redirects are passed back to the client, never followed

pub mod client;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};

pub use client::HttpUpstream;

/// Errors from the outbound fetch.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The request URI names no host, usually because `__host` was rejected.
    #[error("upstream request has no target host: {0}")]
    NoTarget(String),
    #[error("failed to read request body: {0}")]
    RequestBody(#[source] axum::Error),
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Sends a request to its upstream and returns the response head with a
/// streaming body.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn fetch(&self, request: Request<Body>) -> Result<Response<Body>, UpstreamError>;
}
