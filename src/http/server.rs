//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (request ID, tracing, CORS, timeout, body limit)
//! - Build the cache store, upstream client and caching transport
//! - Run the cache sweeper for the server's lifetime
//! - Bind server to listener with graceful shutdown

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::cache::CacheStore;
use crate::config::ProxyConfig;
use crate::http::cors::cors_layer;
use crate::http::request::{request_span, MakeRequestUuidV4, X_REQUEST_ID};
use crate::observability::metrics;
use crate::proxy::{CachePolicy, CachingTransport};
use crate::routing::{RequestRewriter, TargetValidator};
use crate::upstream::{HttpUpstream, Upstream};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub rewriter: Arc<RequestRewriter>,
    pub transport: Arc<CachingTransport>,
    pub reject_unknown_hosts: bool,
}

/// HTTP server for the caching proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    store: CacheStore,
}

impl HttpServer {
    /// Create a server that forwards through a real HTTP(S) client.
    pub fn new(config: ProxyConfig) -> Result<Self, reqwest::Error> {
        let upstream = HttpUpstream::new(&config.timeouts, config.security.max_body_size)?;
        Ok(Self::with_upstream(config, Arc::new(upstream)))
    }

    /// Create a server over any upstream implementation.
    pub fn with_upstream(config: ProxyConfig, upstream: Arc<dyn Upstream>) -> Self {
        let validator = TargetValidator::new(config.upstream.allowed_hosts.iter().cloned());
        if validator.is_empty() {
            tracing::warn!("Upstream allowlist is empty, no request can reach an upstream");
        } else {
            tracing::debug!(hosts = validator.len(), "Upstream allowlist loaded");
        }
        let rewriter = RequestRewriter::new(validator, config.upstream.default_scheme.clone());
        let store = CacheStore::new(config.cache.ttl());
        let transport = CachingTransport::new(
            store.clone(),
            upstream,
            CachePolicy::from(&config.cache),
        );

        let state = AppState {
            rewriter: Arc::new(rewriter),
            transport: Arc::new(transport),
            reject_unknown_hosts: config.upstream.reject_unknown_hosts,
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            store,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID), MakeRequestUuidV4))
                    .layer(TraceLayer::new_for_http().make_span_with(request_span))
                    .layer(PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID)))
                    .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
                    .layer(cors_layer(&config.cors))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    /// The router, for serving on a custom transport or in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// The response cache shared with the transport.
    pub fn cache(&self) -> &CacheStore {
        &self.store
    }

    /// Run the server until `shutdown` fires, sweeping the cache meanwhile.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            allowed_hosts = ?self.config.upstream.allowed_hosts,
            cache_ttl_secs = self.config.cache.ttl_secs,
            "HTTP server starting"
        );

        let sweeper = self
            .store
            .spawn_sweeper(self.config.cache.sweep_interval(), shutdown.resubscribe());

        let result = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await;

        sweeper.abort();
        result?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Main proxy handler.
/// Rewrites the request towards its upstream and answers through the cache.
async fn proxy_handler(State(state): State<AppState>, mut request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();

    let outcome = state.rewriter.rewrite(&mut request);
    if !outcome.is_targeted() && state.reject_unknown_hosts {
        metrics::record_request(&method, StatusCode::BAD_REQUEST.as_u16(), start_time);
        return (StatusCode::BAD_REQUEST, "Upstream host missing or not allowed").into_response();
    }

    let response = match state.transport.fetch(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Proxy request failed");
            e.into_response()
        }
    };

    metrics::record_request(&method, response.status().as_u16(), start_time);
    response
}
