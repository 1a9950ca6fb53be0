//! Editor token issuance.

use axum::extract::State;
use axum::{Extension, Json};
use boardoc_core::models::settings::DocServerTarget;
use chrono::Utc;
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{DocumentServerInfo, EditorResponse};

/// `GET /api/editor?bid=`: board-scoped token and the document server to use.
pub async fn editor(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Extension(target): Extension<DocServerTarget>,
) -> AppResult<Json<EditorResponse>> {
    let board_id = session
        .board
        .clone()
        .ok_or_else(|| AppError::BadRequest("board id parameter is missing".into()))?;
    let (token, claims) = state.codec.issue_editor(&session, &board_id, Utc::now())?;
    info!(user_id = %claims.sub, team_id = %claims.team, board_id = %board_id, "editor token issued");
    Ok(Json(EditorResponse {
        token,
        expires_at: claims.exp,
        document_server: DocumentServerInfo {
            address: target.address,
            header: target.header,
        },
    }))
}
