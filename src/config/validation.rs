//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (TTL > 0, sweep interval bounds)
//! - Validate addresses and allowlisted host syntax
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// Upper bound on the sweep interval, so expired entries cannot pile up for days.
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid socket address for {field}: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("cache.ttl_secs must be greater than zero")]
    ZeroTtl,

    #[error("cache.sweep_interval_secs ({sweep}) must be greater than cache.ttl_secs ({ttl})")]
    SweepNotAfterTtl { sweep: u64, ttl: u64 },

    #[error("cache.sweep_interval_secs ({0}) exceeds the maximum of {max}", max = MAX_SWEEP_INTERVAL_SECS)]
    SweepTooLong(u64),

    #[error("upstream.allowed_hosts entry {0:?} must be a bare host name")]
    InvalidAllowedHost(String),

    #[error("upstream.default_scheme must be \"http\" or \"https\", got {0:?}")]
    InvalidScheme(String),

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroRequestTimeout,
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    let cache = &config.cache;
    if cache.ttl_secs == 0 {
        errors.push(ValidationError::ZeroTtl);
    }
    if cache.sweep_interval_secs <= cache.ttl_secs {
        errors.push(ValidationError::SweepNotAfterTtl {
            sweep: cache.sweep_interval_secs,
            ttl: cache.ttl_secs,
        });
    }
    if cache.sweep_interval_secs > MAX_SWEEP_INTERVAL_SECS {
        errors.push(ValidationError::SweepTooLong(cache.sweep_interval_secs));
    }

    for host in &config.upstream.allowed_hosts {
        if host.is_empty()
            || host.contains("://")
            || host.contains('/')
            || host.chars().any(char::is_whitespace)
        {
            errors.push(ValidationError::InvalidAllowedHost(host.clone()));
        }
    }

    match config.upstream.default_scheme.as_str() {
        "http" | "https" => {}
        other => errors.push(ValidationError::InvalidScheme(other.to_string())),
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
