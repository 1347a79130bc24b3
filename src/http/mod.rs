//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID, trace span)
//!     → cors.rs (preflight answers, allow-* headers on the way out)
//!     → headers.rs (hop-by-hop headers dropped in both directions)
//!     → proxy handler: rewrite → caching transport
//!     → Send to client
//! ```

pub mod cors;
pub mod headers;
pub mod request;
pub mod server;

pub use headers::strip_hop_by_hop;
pub use request::X_REQUEST_ID;
pub use server::HttpServer;
