//! OAuth2 grants for the whiteboard platform.
//!
//! The provider exchanges and refreshes grants, the repository persists them
//! per `(team_id, user_id)`, and [`store::OAuthTokenStore`] ties the two
//! together with single-flight refresh.

pub mod provider;
pub mod queries;
pub mod store;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OAuthError {
    #[error("no OAuth grant for this user")]
    TokenMissing,

    #[error("OAuth provider rejected the request: {0}")]
    Provider(String),

    #[error("OAuth provider unavailable: {0}")]
    Unavailable(String),

    #[error("token storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for OAuthError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<crate::crypto::CryptoError> for OAuthError {
    fn from(e: crate::crypto::CryptoError) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Token endpoint response.
///
/// The platform includes the grant's user and team; other providers may not.
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("expires_in", &self.expires_in)
            .field("user_id", &self.user_id)
            .field("team_id", &self.team_id)
            .finish_non_exhaustive()
    }
}

/// Authorization server operations.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    async fn exchange_code(&self, code: &str, redirect_uri: &str)
    -> Result<TokenGrant, OAuthError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, OAuthError>;
}

/// Errors that can report an access token rejected by the resource server.
pub trait AuthRejection {
    fn is_unauthorized(&self) -> bool;
}
