//! Errors surfaced by the proxying transport.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::cache::CodecError;
use crate::upstream::UpstreamError;

/// A failure on the critical path of a proxied exchange.
///
/// Caching faults that still leave a deliverable response never become a
/// `ProxyError`; they are logged and the response goes out uncached.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The outbound fetch failed. Never cached.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The upstream body could not be read, so there is nothing to deliver.
    #[error("failed to read upstream response body: {0}")]
    Body(#[source] axum::Error),

    /// A stored entry could not be decoded. Served as a failure rather than
    /// as corrupt data.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Upstream(_) | ProxyError::Body(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Codec(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let message = match self {
            ProxyError::Upstream(_) => "Upstream request failed",
            ProxyError::Body(_) => "Upstream response could not be read",
            ProxyError::Codec(_) => "Cached response is corrupt",
        };
        (self.status(), message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let upstream = ProxyError::from(UpstreamError::NoTarget("/x".into()));
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(upstream.into_response().status(), StatusCode::BAD_GATEWAY);

        let codec = ProxyError::from(CodecError::InvalidStatus(42));
        assert_eq!(codec.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
