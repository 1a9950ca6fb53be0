//! # boardoc_core
//!
//! Core domain logic for Boardoc: token signing, OAuth token lifecycle,
//! resilient outbound HTTP, rate limiting, and board settings persistence.

pub mod auth;
pub mod authz;
pub mod crypto;
pub mod docserver;
pub mod migrate;
pub mod models;
pub mod oauth;
pub mod platform;
pub mod rate_limit;
pub mod settings;
pub mod transport;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
