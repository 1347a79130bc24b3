//! Inbound → upstream request rewriting.
//!
//! # Responsibilities
//! - Point the request URI at the host named by `__host` (scheme from `__proto`)
//! - Strip proxy-only query parameters before forwarding
//! - Strip client cookies and conditional/cache request headers
//! - Strip hop-by-hop headers, proxy credentials included
//!
//! # Design Decisions
//! - Rewriting never fails. A missing, disallowed or unusable target leaves the
//!   host as it was (the upstream fetch then usually fails), but the outcome is
//!   reported and logged so the fallback is never silent
//! - Non-proxy query pairs are kept byte for byte and in order

use axum::body::Body;
use axum::http::{
    header::{CACHE_CONTROL, COOKIE, HOST, IF_MODIFIED_SINCE, IF_NONE_MATCH, USER_AGENT},
    HeaderValue, Request, Uri,
};
use url::form_urlencoded;

use crate::http::headers::strip_hop_by_hop;
use crate::observability::metrics;
use crate::routing::allowlist::TargetValidator;

/// Query parameter naming the upstream host.
pub const HOST_PARAM: &str = "__host";
/// Query parameter naming the upstream scheme.
pub const PROTO_PARAM: &str = "__proto";

/// What the rewriter did with the request's target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// URI now points at an allowlisted host.
    Targeted { host: String },
    /// No (or an empty) `__host` parameter.
    MissingHost,
    /// `__host` named a host outside the allowlist.
    DisallowedHost { candidate: String },
    /// `__host`/`__proto` were allowed but did not form a valid URI.
    InvalidTarget { candidate: String },
}

impl RewriteOutcome {
    pub fn is_targeted(&self) -> bool {
        matches!(self, RewriteOutcome::Targeted { .. })
    }

    /// Short label used in logs and metrics for the fallback paths.
    pub fn reason(&self) -> &'static str {
        match self {
            RewriteOutcome::Targeted { .. } => "targeted",
            RewriteOutcome::MissingHost => "missing_host",
            RewriteOutcome::DisallowedHost { .. } => "disallowed_host",
            RewriteOutcome::InvalidTarget { .. } => "invalid_target",
        }
    }
}

/// Rewrites inbound requests into upstream-bound ones.
#[derive(Debug, Clone)]
pub struct RequestRewriter {
    validator: TargetValidator,
    default_scheme: String,
}

impl RequestRewriter {
    pub fn new(validator: TargetValidator, default_scheme: impl Into<String>) -> Self {
        Self {
            validator,
            default_scheme: default_scheme.into(),
        }
    }

    /// Rewrite `req` in place.
    pub fn rewrite(&self, req: &mut Request<Body>) -> RewriteOutcome {
        // Before `Host` is set, so `Connection` cannot name it away.
        strip_hop_by_hop(req.headers_mut());
        let params = ProxyParams::extract(req.uri());

        let outcome = match params.host.as_deref() {
            None => RewriteOutcome::MissingHost,
            Some(host) if !self.validator.is_allowed(host) => RewriteOutcome::DisallowedHost {
                candidate: host.to_string(),
            },
            Some(host) => {
                let scheme = params.proto.as_deref().unwrap_or(&self.default_scheme);
                match params.rebuild(req.uri(), Some((scheme, host))) {
                    Ok(uri) => {
                        *req.uri_mut() = uri;
                        if let Ok(value) = HeaderValue::from_str(host) {
                            req.headers_mut().insert(HOST, value);
                        }
                        RewriteOutcome::Targeted {
                            host: host.to_string(),
                        }
                    }
                    Err(_) => RewriteOutcome::InvalidTarget {
                        candidate: host.to_string(),
                    },
                }
            }
        };

        if !outcome.is_targeted() {
            // Still strip the plumbing even though the host stays put.
            if let Ok(uri) = params.rebuild(req.uri(), None) {
                *req.uri_mut() = uri;
            }
            tracing::warn!(
                reason = outcome.reason(),
                candidate = ?params.host,
                uri = %req.uri(),
                "Upstream host not set, forwarding request unchanged"
            );
            metrics::record_rejected_target(outcome.reason());
        }

        strip_request_headers(req);
        outcome
    }
}

/// Removes headers that must never reach the upstream.
fn strip_request_headers(req: &mut Request<Body>) {
    let headers = req.headers_mut();
    headers.remove(COOKIE);
    if !headers.contains_key(USER_AGENT) {
        headers.insert(USER_AGENT, HeaderValue::from_static(""));
    }
    headers.remove(IF_MODIFIED_SINCE);
    headers.remove(IF_NONE_MATCH);
    headers.remove(CACHE_CONTROL);
}

/// The proxy parameters of a query plus the raw pairs left over.
struct ProxyParams {
    host: Option<String>,
    proto: Option<String>,
    kept: Vec<String>,
}

impl ProxyParams {
    fn extract(uri: &Uri) -> Self {
        let mut host = None;
        let mut proto = None;
        let mut kept = Vec::new();

        for pair in uri.query().unwrap_or("").split('&').filter(|p| !p.is_empty()) {
            let (key, value) = form_urlencoded::parse(pair.as_bytes())
                .next()
                .unwrap_or_default();
            match key.as_ref() {
                // Only the first occurrence counts, and an empty value counts as absent.
                HOST_PARAM => {
                    if host.is_none() {
                        host = Some(value.into_owned());
                    }
                }
                PROTO_PARAM => {
                    if proto.is_none() {
                        proto = Some(value.into_owned());
                    }
                }
                _ => kept.push(pair.to_string()),
            }
        }

        Self {
            host: host.filter(|h| !h.is_empty()),
            proto: proto.filter(|p| !p.is_empty()),
            kept,
        }
    }

    fn path_and_query(&self, uri: &Uri) -> String {
        let path = match uri.path() {
            "" => "/",
            path => path,
        };
        if self.kept.is_empty() {
            path.to_string()
        } else {
            format!("{}?{}", path, self.kept.join("&"))
        }
    }

    /// Build the outgoing URI. `target` replaces scheme and authority;
    /// without it the original ones are kept.
    fn rebuild(&self, original: &Uri, target: Option<(&str, &str)>) -> Result<Uri, axum::http::Error> {
        let mut builder = Uri::builder();
        match target {
            Some((scheme, host)) => {
                builder = builder.scheme(scheme).authority(host);
            }
            None => {
                if let Some(scheme) = original.scheme() {
                    builder = builder.scheme(scheme.clone());
                }
                if let Some(authority) = original.authority() {
                    builder = builder.authority(authority.clone());
                }
            }
        }
        builder.path_and_query(self.path_and_query(original)).build()
    }
}
