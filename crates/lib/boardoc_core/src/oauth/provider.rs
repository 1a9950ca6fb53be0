//! Token endpoint client.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{OAuthError, OAuthProvider, TokenGrant};
use crate::transport::{RetryableTransport, TransportError};

/// Posts form-encoded grants to the platform's token endpoint.
pub struct HttpOAuthProvider {
    transport: RetryableTransport,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl HttpOAuthProvider {
    pub fn new(
        transport: RetryableTransport,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    async fn post(&self, params: &[(&str, &str)]) -> Result<TokenGrant, OAuthError> {
        // Grants are shared between callers; no single request may cancel them.
        let cancel = CancellationToken::new();
        self.transport
            .send_json::<TokenGrant, _>(&cancel, |client| {
                client.post(&self.token_url).form(params)
            })
            .await
            .map_err(|e| {
                warn!(error = %e, "token endpoint call failed");
                match e {
                    TransportError::Rejected { status, .. } => {
                        OAuthError::Provider(format!("HTTP {status}"))
                    }
                    TransportError::Decode(msg) => OAuthError::Provider(msg),
                    other => OAuthError::Unavailable(other.to_string()),
                }
            })
    }
}

#[async_trait]
impl OAuthProvider for HttpOAuthProvider {
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, OAuthError> {
        debug!("exchanging authorization code");
        self.post(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, OAuthError> {
        debug!("refreshing access token");
        self.post(&[
            ("grant_type", "refresh_token"),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}

impl std::fmt::Debug for HttpOAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOAuthProvider")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}
