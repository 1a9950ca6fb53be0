//! Board-level authorization.
//!
//! Roles are fetched from the platform on every check and never cached, since
//! they can change at any time.

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::board::BoardMember;
use crate::oauth::OAuthError;
use crate::oauth::store::OAuthTokenStore;
use crate::platform::{PlatformClient, PlatformError};

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("role {role} is not allowed")]
    Forbidden { role: String },

    #[error("user is not a member of this board")]
    NotMember,

    #[error(transparent)]
    Token(OAuthError),

    #[error(transparent)]
    Platform(PlatformError),
}

impl From<PlatformError> for AccessError {
    fn from(e: PlatformError) -> Self {
        match e {
            PlatformError::NotFound => Self::NotMember,
            PlatformError::Token(t) => Self::Token(t),
            other => Self::Platform(other),
        }
    }
}

/// Require the caller to be the board's owner.
pub async fn require_owner(
    tokens: &OAuthTokenStore,
    platform: &dyn PlatformClient,
    team_id: &str,
    user_id: &str,
    board_id: &str,
    cancel: &CancellationToken,
) -> Result<BoardMember, AccessError> {
    let member = fetch_member(tokens, platform, team_id, user_id, board_id, cancel).await?;
    if !member.role.is_owner() {
        warn!(user_id, board_id, role = member.role.as_str(), "owner access denied");
        return Err(AccessError::Forbidden {
            role: member.role.as_str().to_string(),
        });
    }
    Ok(member)
}

/// Require any role that can at least view the board.
pub async fn require_viewer(
    tokens: &OAuthTokenStore,
    platform: &dyn PlatformClient,
    team_id: &str,
    user_id: &str,
    board_id: &str,
    cancel: &CancellationToken,
) -> Result<BoardMember, AccessError> {
    let member = fetch_member(tokens, platform, team_id, user_id, board_id, cancel).await?;
    if !member.role.can_view() {
        warn!(user_id, board_id, role = member.role.as_str(), "view access denied");
        return Err(AccessError::Forbidden {
            role: member.role.as_str().to_string(),
        });
    }
    Ok(member)
}

async fn fetch_member(
    tokens: &OAuthTokenStore,
    platform: &dyn PlatformClient,
    team_id: &str,
    user_id: &str,
    board_id: &str,
    cancel: &CancellationToken,
) -> Result<BoardMember, AccessError> {
    let member = tokens
        .call(team_id, user_id, |token| async move {
            platform
                .get_board_member(board_id, user_id, &token, cancel)
                .await
        })
        .await?;
    debug!(user_id, board_id, role = member.role.as_str(), "board role resolved");
    Ok(member)
}
