//! JWT session and editor token generation and verification.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use super::{CodecError, classify};
use crate::models::auth::Claims;

/// Default session cookie lifetime: 24 hours.
pub const COOKIE_LIFETIME_SECS: i64 = 24 * 60 * 60;

/// Signs and verifies the application's own HS256 tokens.
///
/// The signing key is fixed for the lifetime of the codec.
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    cookie_lifetime: Duration,
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            cookie_lifetime: Duration::seconds(COOKIE_LIFETIME_SECS),
        }
    }

    pub fn with_cookie_lifetime(mut self, lifetime: Duration) -> Self {
        self.cookie_lifetime = lifetime;
        self
    }

    pub fn cookie_lifetime(&self) -> Duration {
        self.cookie_lifetime
    }

    /// Sign an arbitrary claim set.
    pub fn issue(&self, claims: &Claims) -> Result<String, CodecError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Issue a session token for a platform user, valid for the cookie lifetime.
    pub fn issue_session(
        &self,
        user_id: &str,
        team_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(String, Claims), CodecError> {
        let claims = Claims {
            sub: user_id.to_string(),
            team: team_id.to_string(),
            board: None,
            iat: now.timestamp(),
            exp: (now + self.cookie_lifetime).timestamp(),
        };
        let token = self.issue(&claims)?;
        Ok((token, claims))
    }

    /// Issue a board-scoped editor token derived from a verified session.
    ///
    /// The expiry is the session's issue time plus the cookie lifetime, so an
    /// editor token never outlives the session it was minted from.
    pub fn issue_editor(
        &self,
        session: &Claims,
        board_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(String, Claims), CodecError> {
        let claims = Claims {
            sub: session.sub.clone(),
            team: session.team.clone(),
            board: Some(board_id.to_string()),
            iat: now.timestamp(),
            exp: session.iat + self.cookie_lifetime.num_seconds(),
        };
        let token = self.issue(&claims)?;
        Ok((token, claims))
    }

    /// Verify a token: signature first, then expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, CodecError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| classify(token, &e))
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("cookie_lifetime", &self.cookie_lifetime)
            .finish_non_exhaustive()
    }
}
