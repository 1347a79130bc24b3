//! Response caching subsystem.
//!
//! # Data Flow
//! ```text
//! Rewritten request
//!     → key.rs (method + host + URL → CacheKey)
//!     → store.rs (lookup)
//!         hit:  codec.rs decode → thaw → replayable response
//!         miss: upstream response → codec.rs buffer → freeze → encode → store.rs insert
//! ```
//!
//! # Design Decisions
//! - The store holds encoded bytes, so every hit decodes a private copy
//! - Expiry is time based only; a background sweeper bounds memory between reads

pub mod codec;
pub mod key;
pub mod store;

pub use codec::{strip_cors_headers, BufferedResponse, CachedResponse, CodecError, Decompressed};
pub use key::CacheKey;
pub use store::CacheStore;
