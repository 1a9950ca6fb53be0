//! Authentication domain models.
//!
//! These are internal domain models, distinct from the API response types
//! (which have `#[serde(rename)]` for camelCase etc.).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// JWT claims embedded in session and editor tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: platform user ID.
    pub sub: String,
    /// Platform team ID.
    pub team: String,
    /// Board ID, present on editor tokens only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board: Option<String>,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

/// Identity asserted by the whiteboard platform for its signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformIdentity {
    pub user_id: String,
    pub team_id: String,
}

/// OAuth grant stored per `(team_id, user_id)`.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub team_id: String,
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Whether the access token is expired, or will be within `skew`.
    pub fn is_expired(&self, now: DateTime<Utc>, skew: chrono::Duration) -> bool {
        self.expires_at <= now + skew
    }
}

impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("team_id", &self.team_id)
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(expires_at: DateTime<Utc>) -> TokenRecord {
        TokenRecord {
            team_id: "t1".into(),
            user_id: "u1".into(),
            access_token: "access-secret".into(),
            refresh_token: "refresh-secret".into(),
            expires_at,
        }
    }

    #[test]
    fn expiry_honours_skew() {
        let now = Utc::now();
        let rec = record(now + Duration::seconds(20));
        assert!(!rec.is_expired(now, Duration::zero()));
        assert!(rec.is_expired(now, Duration::seconds(30)));
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let rendered = format!("{:?}", record(Utc::now()));
        assert!(!rendered.contains("access-secret"));
        assert!(!rendered.contains("refresh-secret"));
    }
}
