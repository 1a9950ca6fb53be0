//! Session issuance for platform-authenticated users.

use axum::Json;
use axum::extract::State;
use axum_extra::extract::cookie::CookieJar;
use tracing::info;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::AuthorizeResponse;
use crate::services::cookies::session_cookie;

/// `GET /api/authorize`: exchange a platform assertion for the session cookie.
///
/// The advertised expiry is the `exp` of the claims just signed.
pub async fn authorize(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<AuthorizeResponse>)> {
    let token = state.codec.issue(&claims)?;
    info!(user_id = %claims.sub, team_id = %claims.team, "session issued");
    Ok((
        jar.add(session_cookie(&token, claims.exp, claims.iat)),
        Json(AuthorizeResponse {
            expires_at: claims.exp,
        }),
    ))
}
