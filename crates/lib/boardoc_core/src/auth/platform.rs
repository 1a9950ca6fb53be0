//! Verification of identity assertions issued by the whiteboard platform.
//!
//! The platform's web SDK hands the embedded app a short-lived id token for
//! the signed-in user, signed (HS256) with the app's client secret.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use tracing::debug;

use super::{CodecError, classify};
use crate::models::auth::PlatformIdentity;

/// Verifies a platform identity assertion.
#[async_trait]
pub trait PlatformVerifier: Send + Sync {
    async fn verify(&self, assertion: &str) -> Result<PlatformIdentity, CodecError>;
}

/// Claims carried by the platform's id token.
#[derive(Debug, Deserialize)]
struct AssertionClaims {
    user: String,
    team: String,
}

/// Verifies id tokens signed with the app's client secret.
pub struct SignedAssertionVerifier {
    decoding: DecodingKey,
    validation: Validation,
}

impl SignedAssertionVerifier {
    pub fn new(client_secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);
        Self {
            decoding: DecodingKey::from_secret(client_secret),
            validation,
        }
    }
}

#[async_trait]
impl PlatformVerifier for SignedAssertionVerifier {
    async fn verify(&self, assertion: &str) -> Result<PlatformIdentity, CodecError> {
        let data = decode::<AssertionClaims>(assertion, &self.decoding, &self.validation)
            .map_err(|e| classify(assertion, &e))?;
        debug!(user_id = %data.claims.user, team_id = %data.claims.team, "platform assertion verified");
        Ok(PlatformIdentity {
            user_id: data.claims.user,
            team_id: data.claims.team,
        })
    }
}
