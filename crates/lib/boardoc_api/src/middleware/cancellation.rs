//! Per-request cancellation.
//!
//! Each request gets a [`CancellationToken`] that is cancelled when axum drops
//! the request future (client disconnect) or the request ceiling expires.
//! Outbound calls take the token so they stop with the request.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::AppError;

#[derive(Debug, Clone, Default)]
pub struct RequestCancellation(pub CancellationToken);

impl<S> FromRequestParts<S> for RequestCancellation
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestCancellation>()
            .cloned()
            .unwrap_or_default())
    }
}

pub async fn propagate_cancellation(
    State(timeout): State<Duration>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = CancellationToken::new();
    request
        .extensions_mut()
        .insert(RequestCancellation(token.clone()));
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let _guard = token.clone().drop_guard();
    match tokio::time::timeout(timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            token.cancel();
            warn!(%method, path = %path, timeout_ms = timeout.as_millis() as u64, "request timed out");
            AppError::Timeout.into_response()
        }
    }
}
