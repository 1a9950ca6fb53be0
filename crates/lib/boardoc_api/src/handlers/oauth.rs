//! OAuth consent completion.

use axum::extract::{Query, State};
use axum::http::{StatusCode, header::LOCATION};
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::cancellation::RequestCancellation;
use crate::models::OAuthQuery;

/// `GET /api/oauth?code=`: store the grant, then send the user to the
/// install-complete page.
pub async fn oauth(
    State(state): State<AppState>,
    RequestCancellation(cancel): RequestCancellation,
    Query(query): Query<OAuthQuery>,
) -> AppResult<Response> {
    if let Some(error) = query.error {
        warn!(error = %error, "platform reported an authorization error");
        return Err(AppError::BadRequest("authorization was not granted".into()));
    }
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("authorization code is missing".into()))?;

    let record = state
        .tokens
        .complete_handshake(
            &code,
            &state.config.platform.redirect_uri,
            state.platform.as_ref(),
            &cancel,
        )
        .await?;
    info!(team_id = %record.team_id, user_id = %record.user_id, "app installed");

    Ok((
        StatusCode::FOUND,
        [(LOCATION, state.config.platform.install_redirect.clone())],
    )
        .into_response())
}
