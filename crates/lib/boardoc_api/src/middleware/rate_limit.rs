//! Inbound rate limiting per client identity.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use boardoc_core::rate_limit::{RateLimitFailureMode, RateLimiter};
use tracing::{error, warn};

use crate::error::AppError;

/// Client address as seen by the proxy in front of the service.
///
/// Exactly one trusted reverse proxy is assumed. It appends the address it
/// received the connection from to `X-Forwarded-For`, so only the last hop is
/// trustworthy; earlier hops are whatever the client chose to send. Falls back
/// to `X-Real-IP`, then to the peer address.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    header("x-forwarded-for")
        .or_else(|| header("x-real-ip"))
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identity = client_identity(request.headers(), peer);

    match limiter.allow(&identity).await {
        Ok(decision) if decision.allowed => Ok(next.run(request).await),
        Ok(decision) => {
            warn!(identity = %identity, retry_after_ms = decision.retry_after.as_millis() as u64, "rate limited");
            Err(AppError::RateLimited {
                retry_after: decision.retry_after,
            })
        }
        Err(e) => match limiter.failure_mode() {
            RateLimitFailureMode::Open => {
                warn!(identity = %identity, error = %e, "rate limit store failed, allowing request");
                Ok(next.run(request).await)
            }
            RateLimitFailureMode::Closed => {
                error!(identity = %identity, error = %e, "rate limit store failed, rejecting request");
                Err(e.into())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn identity_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        let peer = "127.0.0.1:9000".parse().ok();
        assert_eq!(client_identity(&headers, peer), "10.0.0.1");

        headers.remove("x-forwarded-for");
        assert_eq!(client_identity(&headers, peer), "198.51.100.2");

        assert_eq!(client_identity(&HeaderMap::new(), peer), "127.0.0.1");
        assert_eq!(client_identity(&HeaderMap::new(), None), "unknown");
    }

    #[test]
    fn spoofed_forwarded_hops_do_not_change_identity() {
        let peer = "127.0.0.1:9000".parse().ok();
        let mut honest = HeaderMap::new();
        honest.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.9"));
        let mut spoofed = HeaderMap::new();
        spoofed.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8, 198.51.100.9"),
        );
        assert_eq!(client_identity(&honest, peer), client_identity(&spoofed, peer));
    }
}
