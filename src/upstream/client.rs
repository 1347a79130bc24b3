//! reqwest-backed upstream client.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use reqwest::redirect::Policy;

use crate::config::schema::TimeoutConfig;
use crate::upstream::{Upstream, UpstreamError};

/// Forwards requests over HTTP(S) with a shared connection pool.
///
/// Response bodies are passed through undecoded, so responses never carry
/// the `Decompressed` marker.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    max_body_size: usize,
}

impl HttpUpstream {
    /// Build a client honouring the configured timeouts. Request bodies are
    /// buffered up to `max_body_size` bytes before forwarding.
    pub fn new(timeouts: &TimeoutConfig, max_body_size: usize) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .timeout(Duration::from_secs(timeouts.request_secs))
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            client,
            max_body_size,
        })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, request: Request<Body>) -> Result<Response<Body>, UpstreamError> {
        if request.uri().authority().is_none() {
            return Err(UpstreamError::NoTarget(request.uri().to_string()));
        }

        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(UpstreamError::RequestBody)?;
        let request = reqwest::Request::try_from(Request::from_parts(parts, body))?;

        tracing::debug!(method = %request.method(), url = %request.url(), "Forwarding upstream");
        let response = self.client.execute(request).await?;

        let response: Response<reqwest::Body> = response.into();
        Ok(response.map(Body::new))
    }
}
