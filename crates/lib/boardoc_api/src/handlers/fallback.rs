//! Unknown routes.

use axum::extract::State;
use axum::http::{StatusCode, Uri, header::LOCATION};
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::AppState;

/// Redirect anything unrouted to the platform's marketing page.
pub async fn fallback(State(state): State<AppState>, uri: Uri) -> Response {
    debug!(path = %uri.path(), "unknown route, redirecting");
    (
        StatusCode::FOUND,
        [(LOCATION, state.config.platform.marketing_url.clone())],
    )
        .into_response()
}
