//! Whiteboard platform models: board membership, users, document items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a member on a board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardRole {
    Owner,
    Coowner,
    Editor,
    Commenter,
    Viewer,
    Guest,
    Other(String),
}

impl BoardRole {
    /// Parse a platform role string. Comparison is case-insensitive.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "owner" => Self::Owner,
            "coowner" => Self::Coowner,
            "editor" => Self::Editor,
            "commenter" => Self::Commenter,
            "viewer" => Self::Viewer,
            "guest" => Self::Guest,
            _ => Self::Other(raw.to_string()),
        }
    }

    pub fn is_owner(&self) -> bool {
        matches!(self, Self::Owner)
    }

    /// Any known role grants at least read access to the board.
    pub fn can_view(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Owner => "owner",
            Self::Coowner => "coowner",
            Self::Editor => "editor",
            Self::Commenter => "commenter",
            Self::Viewer => "viewer",
            Self::Guest => "guest",
            Self::Other(raw) => raw,
        }
    }
}

impl<'de> Deserialize<'de> for BoardRole {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// A board member as reported by the platform.
#[derive(Debug, Clone, Deserialize)]
pub struct BoardMember {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub role: BoardRole,
}

/// The user and team an OAuth access token belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub user_id: String,
    pub user_name: Option<String>,
    pub team_id: String,
}

/// A document item placed on a board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentItem {
    pub id: String,
    pub title: String,
    /// Platform-hosted download location of the document.
    pub document_url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// One page of a board's document items.
#[derive(Debug, Clone, Default)]
pub struct DocumentPage {
    pub items: Vec<DocumentItem>,
    /// Opaque cursor for the next page, `None` on the last one.
    pub cursor: Option<String>,
}

/// A document to place on a board. The platform fetches the file from `url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    pub title: String,
    pub url: String,
}
