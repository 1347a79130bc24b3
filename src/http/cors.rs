//! The proxy's own CORS policy.
//!
//! Upstream CORS allow-* headers are stripped by the caching transport; this
//! layer is the only source of them on the way out.

use std::time::Duration;

use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::CorsConfig;

/// Methods a cross-origin caller may use.
const ALLOWED_METHODS: [Method; 9] = [
    Method::CONNECT,
    Method::POST,
    Method::DELETE,
    Method::GET,
    Method::HEAD,
    Method::OPTIONS,
    Method::PATCH,
    Method::PUT,
    Method::TRACE,
];

/// Build the CORS layer from config. `"*"` among the origins allows any.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins = if config.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(config.allowed_origins.iter().filter_map(|origin| {
            match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            }
        }))
    };

    let layer = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(ALLOWED_METHODS)
        .allow_credentials(false);

    match config.max_age_secs {
        Some(secs) => layer.max_age(Duration::from_secs(secs)),
        None => layer,
    }
}
