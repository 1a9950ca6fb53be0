//! Request and response bodies of the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use boardoc_core::models::board::DocumentItem;
use boardoc_core::models::settings::Settings;

/// Item type the platform uses for documents.
const DOCUMENT_TYPE: &str = "document";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// `GET /api/authorize` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeResponse {
    /// Session expiry, unix seconds.
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentServerInfo {
    pub address: String,
    pub header: String,
}

/// `GET /api/editor` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorResponse {
    pub token: String,
    pub expires_at: i64,
    pub document_server: DocumentServerInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoardQuery {
    pub bid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoResponse {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<i64>,
}

/// Stored board settings. The secret itself is never returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    pub address: String,
    pub header: String,
    pub has_secret: bool,
    pub demo_detached: bool,
    pub demo: DemoResponse,
}

impl From<&Settings> for SettingsResponse {
    fn from(s: &Settings) -> Self {
        Self {
            address: s.address.clone(),
            header: s.header.clone(),
            has_secret: !s.secret.is_empty(),
            demo_detached: s.demo_detached,
            demo: DemoResponse {
                enabled: s.demo.enabled,
                started: s.demo.started.map(|t| t.timestamp()),
            },
        }
    }
}

/// `POST /api/settings` body. Absent fields keep their stored value.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistSettingsRequest {
    pub board_id: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub demo: Option<bool>,
}

impl std::fmt::Debug for PersistSettingsRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistSettingsRequest")
            .field("board_id", &self.board_id)
            .field("address", &self.address)
            .field("header", &self.header)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("demo", &self.demo)
            .finish()
    }
}

fn default_output_type() -> String {
    "pdf".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConvertQuery {
    pub bid: Option<String>,
    pub fid: Option<String>,
    #[serde(default = "default_output_type")]
    pub outputtype: String,
}

/// `GET /api/files/convert` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    pub end_convert: bool,
    pub percent: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilesQuery {
    pub bid: Option<String>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentData {
    pub title: String,
    pub document_url: String,
}

/// A board document as the panel lists it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: DocumentData,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl From<DocumentItem> for DocumentEntry {
    fn from(item: DocumentItem) -> Self {
        Self {
            id: item.id,
            kind: DOCUMENT_TYPE.to_string(),
            data: DocumentData {
                title: item.title,
                document_url: item.document_url,
            },
            created_at: item.created_at,
            modified_at: item.modified_at,
        }
    }
}

/// `GET /api/files` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsResponse {
    pub data: Vec<DocumentEntry>,
    /// Pass back as `cursor` to fetch the next page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// `POST /api/files/create` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileRequest {
    #[serde(default)]
    pub board_id: Option<String>,
    #[serde(default)]
    pub name: String,
    /// Extension of the blank document: `docx`, `xlsx` or `pptx`.
    #[serde(default, rename = "type")]
    pub file_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLinks {
    #[serde(rename = "self")]
    pub self_link: String,
}

/// `POST /api/files/create` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCreatedResponse {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub links: FileLinks,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl From<DocumentItem> for FileCreatedResponse {
    fn from(item: DocumentItem) -> Self {
        Self {
            id: item.id,
            name: item.title,
            kind: DOCUMENT_TYPE.to_string(),
            links: FileLinks {
                self_link: item.document_url,
            },
            created_at: item.created_at,
            modified_at: item.modified_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackResponse {
    pub error: i64,
}
