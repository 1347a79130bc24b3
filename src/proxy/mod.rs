//! Proxy pipeline.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → routing::rewrite (target host, strip plumbing)
//!     → transport.rs
//!         → cache lookup ─ hit ──────────────────────────────▶ X-Cache: hit
//!         → miss → upstream fetch → strip CORS → buffer → store ▶ X-Cache: miss
//! ```

pub mod transport;

pub use transport::{CachePolicy, CachingTransport, X_CACHE};
