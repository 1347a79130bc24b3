//! Upstream targeting subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request (?__host=...&__proto=...)
//!     → allowlist.rs (is the host permitted?)
//!     → rewrite.rs (set scheme/authority, strip plumbing and sensitive headers)
//!     → request ready for the caching transport
//! ```
//!
//! # Design Decisions
//! - Host matching is exact and case-sensitive
//! - A rejected host degrades to "forward unchanged" unless the server is
//!   configured to reject it

pub mod allowlist;
pub mod rewrite;

pub use allowlist::TargetValidator;
pub use rewrite::{RequestRewriter, RewriteOutcome, HOST_PARAM, PROTO_PARAM};
