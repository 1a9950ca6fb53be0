//! Whiteboard platform REST client.
//!
//! Only the calls the integration needs: board membership, the identity
//! behind an access token, and document items.

pub mod rest;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::board::{BoardMember, DocumentItem, DocumentPage, NewDocument, UserInfo};
use crate::oauth::{AuthRejection, OAuthError};
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform rejected the access token")]
    Unauthorized,

    #[error("resource not found on the platform")]
    NotFound,

    #[error("platform rejected the request: {0}")]
    Rejected(String),

    #[error("platform unavailable: {0}")]
    Unavailable(String),

    #[error("platform request cancelled")]
    Cancelled,

    #[error(transparent)]
    Token(#[from] OAuthError),
}

impl AuthRejection for PlatformError {
    fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

impl From<TransportError> for PlatformError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Rejected { status, .. } => match status.as_u16() {
                401 => Self::Unauthorized,
                404 => Self::NotFound,
                _ => Self::Rejected(format!("HTTP {status}")),
            },
            TransportError::Cancelled { .. } => Self::Cancelled,
            TransportError::Decode(msg) => Self::Rejected(msg),
            TransportError::Invalid(e) => Self::Rejected(e.to_string()),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Membership of `member_id` on `board_id`.
    async fn get_board_member(
        &self,
        board_id: &str,
        member_id: &str,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<BoardMember, PlatformError>;

    /// The user and team `access_token` was granted for.
    async fn get_user_info(
        &self,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<UserInfo, PlatformError>;

    async fn get_document(
        &self,
        board_id: &str,
        item_id: &str,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<DocumentItem, PlatformError>;

    /// Document items on `board_id`, one page at a time. Pass the previous
    /// page's cursor to continue.
    async fn list_documents(
        &self,
        board_id: &str,
        cursor: Option<&str>,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<DocumentPage, PlatformError>;

    async fn create_document(
        &self,
        board_id: &str,
        document: &NewDocument,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<DocumentItem, PlatformError>;
}
