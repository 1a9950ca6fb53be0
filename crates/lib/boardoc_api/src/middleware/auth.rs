//! Authentication middleware.
//!
//! Three strategies share the [`Authenticator`] trait and one generic axum
//! middleware, [`authenticate`], which stores the resulting claims as an
//! [`AuthenticatedUser`] request extension. Every strategy verifies a
//! signature before it performs any I/O.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use boardoc_core::auth::jwt::TokenCodec;
use boardoc_core::auth::platform::PlatformVerifier;
use boardoc_core::authz::{self, AccessError};
use boardoc_core::models::auth::Claims;
use boardoc_core::models::settings::DocServerTarget;
use boardoc_core::oauth::OAuthError;
use boardoc_core::oauth::store::OAuthTokenStore;
use boardoc_core::platform::{PlatformClient, PlatformError};
use boardoc_core::settings::{SettingsError, SettingsStore};
use chrono::Utc;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::middleware::cancellation::RequestCancellation;
use crate::models::BoardQuery;
use crate::services::cookies::SESSION_COOKIE;

/// Verified claims of the caller, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Claims);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(AppError::Unauthenticated)
    }
}

/// One way of establishing who the caller is.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, parts: &mut Parts) -> Result<Claims, AppError>;
}

/// Axum middleware running `A` and injecting [`AuthenticatedUser`].
pub async fn authenticate<A>(
    State(authenticator): State<Arc<A>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError>
where
    A: Authenticator + 'static,
{
    let (mut parts, body) = request.into_parts();
    let claims = authenticator.authenticate(&mut parts).await?;
    parts.extensions.insert(AuthenticatedUser(claims));
    Ok(next.run(Request::from_parts(parts, body)).await)
}

fn bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The application's own signed token, from a bearer header or the session cookie.
pub struct TokenAuthenticator {
    codec: Arc<TokenCodec>,
}

impl TokenAuthenticator {
    pub fn new(codec: Arc<TokenCodec>) -> Self {
        Self { codec }
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn authenticate(&self, parts: &mut Parts) -> Result<Claims, AppError> {
        let token = match bearer(parts) {
            Some(t) => t.to_string(),
            None => CookieJar::from_headers(&parts.headers)
                .get(SESSION_COOKIE)
                .map(|c| c.value().to_string())
                .ok_or(AppError::Unauthenticated)?,
        };
        Ok(self.codec.verify(&token)?)
    }
}

/// Identity asserted by the platform SDK, re-wrapped as session claims.
pub struct PlatformSessionAuthenticator {
    verifier: Arc<dyn PlatformVerifier>,
    codec: Arc<TokenCodec>,
}

impl PlatformSessionAuthenticator {
    pub fn new(verifier: Arc<dyn PlatformVerifier>, codec: Arc<TokenCodec>) -> Self {
        Self { verifier, codec }
    }
}

#[async_trait]
impl Authenticator for PlatformSessionAuthenticator {
    async fn authenticate(&self, parts: &mut Parts) -> Result<Claims, AppError> {
        let assertion = bearer(parts).ok_or(AppError::Unauthenticated)?;
        let identity = self.verifier.verify(assertion).await?;
        let now = Utc::now();
        Ok(Claims {
            sub: identity.user_id,
            team: identity.team_id,
            board: None,
            iat: now.timestamp(),
            exp: (now + self.codec.cookie_lifetime()).timestamp(),
        })
    }
}

/// Session token plus everything needed to open an editor on a board.
///
/// On success the returned claims carry the board id and the resolved
/// [`DocServerTarget`] is added to the request extensions.
pub struct EditorAuthenticator {
    inner: TokenAuthenticator,
    tokens: Arc<OAuthTokenStore>,
    settings: Arc<dyn SettingsStore>,
    platform: Arc<dyn PlatformClient>,
    demo_server: Option<DocServerTarget>,
}

impl EditorAuthenticator {
    pub fn new(
        inner: TokenAuthenticator,
        tokens: Arc<OAuthTokenStore>,
        settings: Arc<dyn SettingsStore>,
        platform: Arc<dyn PlatformClient>,
        demo_server: Option<DocServerTarget>,
    ) -> Self {
        Self {
            inner,
            tokens,
            settings,
            platform,
            demo_server,
        }
    }
}

#[async_trait]
impl Authenticator for EditorAuthenticator {
    async fn authenticate(&self, parts: &mut Parts) -> Result<Claims, AppError> {
        let mut claims = self.inner.authenticate(parts).await?;

        let board_id = Query::<BoardQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.bid)
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| AppError::BadRequest("board id parameter is missing".into()))?;

        let (team_id, user_id) = (claims.team.clone(), claims.sub.clone());
        self.tokens.find(&team_id, &user_id).await.map_err(|e| match e {
            OAuthError::TokenMissing => {
                warn!(team_id = %team_id, user_id = %user_id, "no platform authorization for editor");
                AppError::TokenMissing
            }
            other => {
                warn!(team_id = %team_id, user_id = %user_id, error = %other, "could not load platform grant");
                AppError::BadRequest("could not retrieve required data".into())
            }
        })?;

        let settings = self
            .settings
            .find(&team_id, &board_id)
            .await
            .map_err(|e| match e {
                SettingsError::NotFound => AppError::SettingsNotConfigured,
                other => {
                    warn!(team_id = %team_id, board_id = %board_id, error = %other, "could not load board settings");
                    AppError::BadRequest("could not retrieve required data".into())
                }
            })?;
        let target = settings
            .document_server(Utc::now(), self.demo_server.as_ref())
            .ok_or(AppError::SettingsNotConfigured)?;

        let cancel = parts
            .extensions
            .get::<RequestCancellation>()
            .map(|c| c.0.clone())
            .unwrap_or_default();
        authz::require_viewer(
            &self.tokens,
            self.platform.as_ref(),
            &team_id,
            &user_id,
            &board_id,
            &cancel,
        )
        .await
        .map_err(|e| match e {
            AccessError::Token(OAuthError::TokenMissing) => AppError::TokenMissing,
            AccessError::Platform(PlatformError::Cancelled) => AppError::Timeout,
            other => {
                warn!(team_id = %team_id, user_id = %user_id, board_id = %board_id, error = %other, "editor access check failed");
                AppError::BadRequest("could not verify board access".into())
            }
        })?;

        debug!(team_id = %team_id, user_id = %user_id, board_id = %board_id, "editor authenticated");
        parts.extensions.insert(target);
        claims.board = Some(board_id);
        Ok(claims)
    }
}
