//! Board settings endpoints. Owner only.

use axum::Json;
use axum::extract::{Query, State};
use boardoc_core::authz::require_owner;
use boardoc_core::docserver::DocServerClient;
use boardoc_core::models::settings::{DocServerTarget, Settings};
use boardoc_core::settings::{SettingsError, SettingsUpdate};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::middleware::cancellation::RequestCancellation;
use crate::models::{BoardQuery, PersistSettingsRequest, SettingsResponse};

/// `GET /api/settings?bid=`
pub async fn get_settings(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    RequestCancellation(cancel): RequestCancellation,
    Query(query): Query<BoardQuery>,
) -> AppResult<Json<SettingsResponse>> {
    let board_id = query
        .bid
        .filter(|b| !b.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("board id parameter is missing".into()))?;

    require_owner(
        &state.tokens,
        state.platform.as_ref(),
        &claims.team,
        &claims.sub,
        &board_id,
        &cancel,
    )
    .await?;

    let settings = match state.settings.find(&claims.team, &board_id).await {
        Ok(s) => s,
        Err(SettingsError::NotFound) => Settings::default(),
        Err(e) => return Err(e.into()),
    };
    Ok(Json(SettingsResponse::from(&settings)))
}

/// `POST /api/settings`
pub async fn post_settings(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    RequestCancellation(cancel): RequestCancellation,
    Json(body): Json<PersistSettingsRequest>,
) -> AppResult<Json<SettingsResponse>> {
    if body.board_id.trim().is_empty() {
        return Err(AppError::BadRequest("board id parameter is missing".into()));
    }
    let board_id = body.board_id.trim().to_string();

    require_owner(
        &state.tokens,
        state.platform.as_ref(),
        &claims.team,
        &claims.sub,
        &board_id,
        &cancel,
    )
    .await?;

    if let Some(address) = body.address.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        validate_address(address)?;
    }

    let update = to_update(&body);
    let saved = state.settings.save(&claims.team, &board_id, update).await?;
    info!(board_id = %board_id, user_id = %claims.sub, team_id = %claims.team, "settings updated");

    if let Some(target) = saved.document_server(Utc::now(), None) {
        check_document_server(state.docserver.clone(), target, board_id);
    }
    Ok(Json(SettingsResponse::from(&saved)))
}

/// Ask a newly saved document server for its version. The outcome is logged
/// only and never blocks the save.
fn check_document_server(docserver: DocServerClient, target: DocServerTarget, board_id: String) {
    tokio::spawn(async move {
        let cancel = CancellationToken::new();
        if let Err(e) = docserver.get_version(&cancel, &target).await {
            warn!(board_id = %board_id, address = %target.address, error = %e, "document server check failed");
        }
    });
}

fn to_update(body: &PersistSettingsRequest) -> SettingsUpdate {
    let mut update = SettingsUpdate::new();
    if let Some(address) = &body.address {
        update = update.address(address.as_str());
    }
    if let Some(header) = &body.header {
        update = update.header(header.as_str());
    }
    if let Some(secret) = &body.secret {
        update = update.secret(secret.as_str());
    }
    if let Some(demo) = body.demo {
        update = update.demo(demo);
    }
    update
}

fn validate_address(address: &str) -> AppResult<()> {
    let url = Url::parse(address)
        .map_err(|e| AppError::Validation(format!("address is not a valid URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::Validation("address must use http or https".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_must_be_http() {
        assert!(validate_address("https://ds.example").is_ok());
        assert!(validate_address("ftp://ds.example").is_err());
        assert!(validate_address("ds.example").is_err());
    }
}
