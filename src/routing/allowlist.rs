//! Upstream target validation.
//!
//! # Responsibilities
//! - Decide whether a `__host` candidate may be proxied to
//!
//! # Design Decisions
//! - Exact, case-sensitive match: no case folding, no port stripping
//! - The set is built once from config and never mutated
//! - A rejected candidate is not an error; the rewriter forwards the request
//!   with its host untouched

use std::collections::HashSet;

/// Allowlist of upstream hosts.
#[derive(Debug, Clone, Default)]
pub struct TargetValidator {
    allowed: HashSet<String>,
}

impl TargetValidator {
    /// Create a validator from the configured host names.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: hosts.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if `candidate` is one of the allowed hosts, byte for byte.
    pub fn is_allowed(&self, candidate: &str) -> bool {
        self.allowed.contains(candidate)
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let validator = TargetValidator::new(["api.github.com", "127.0.0.1:8081"]);

        assert_eq!(validator.len(), 2);
        assert!(validator.is_allowed("api.github.com"));
        assert!(validator.is_allowed("127.0.0.1:8081"));
        assert!(!validator.is_allowed("evil.example"));
        assert!(!validator.is_allowed(""));
    }

    #[test]
    fn test_no_normalization() {
        let validator = TargetValidator::new(["api.github.com"]);

        assert!(!validator.is_allowed("API.GITHUB.COM"));
        assert!(!validator.is_allowed("api.github.com:443"));
        assert!(!validator.is_allowed(" api.github.com"));
        assert!(!validator.is_allowed("api.github.com."));
    }

    #[test]
    fn test_empty_allowlist_rejects_everything() {
        let validator = TargetValidator::default();
        assert!(validator.is_empty());
        assert!(!validator.is_allowed("api.github.com"));
    }
}
