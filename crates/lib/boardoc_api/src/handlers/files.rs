//! Board documents: listing, creation from blank templates, conversion.
//!
//! Every endpoint first resolves the board: a missing board id is 400, a
//! missing platform grant 401, and a board without a usable document server
//! 409. Anything else going wrong on the way is reported as 400.

use axum::Json;
use axum::extract::{Query, State};
use boardoc_core::docserver::ConvertRequest;
use boardoc_core::models::auth::Claims;
use boardoc_core::models::board::NewDocument;
use boardoc_core::models::settings::DocServerTarget;
use boardoc_core::oauth::OAuthError;
use boardoc_core::platform::PlatformError;
use boardoc_core::settings::SettingsError;
use chrono::Utc;
use tracing::{info, warn};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::middleware::cancellation::RequestCancellation;
use crate::models::{
    ConvertQuery, ConvertResponse, CreateFileRequest, DocumentEntry, DocumentsResponse,
    FileCreatedResponse, FilesQuery,
};

/// Extensions new documents can be created with.
const TEMPLATE_TYPES: [&str; 3] = ["docx", "xlsx", "pptx"];

/// A board the caller may work with, and its document server.
struct PreparedBoard {
    board_id: String,
    target: DocServerTarget,
}

async fn prepare(state: &AppState, claims: &Claims, bid: Option<String>) -> AppResult<PreparedBoard> {
    let board_id = non_empty(bid, "board id")?;

    match state.tokens.find(&claims.team, &claims.sub).await {
        Ok(_) => {}
        Err(OAuthError::TokenMissing) => return Err(AppError::TokenMissing),
        Err(e) => {
            warn!(board_id = %board_id, error = %e, "could not load platform grant");
            return Err(AppError::BadRequest("could not retrieve required data".into()));
        }
    }

    let settings = match state.settings.find(&claims.team, &board_id).await {
        Ok(s) => s,
        Err(SettingsError::NotFound) => return Err(AppError::SettingsNotConfigured),
        Err(e) => {
            warn!(board_id = %board_id, error = %e, "could not load board settings");
            return Err(AppError::BadRequest("could not retrieve required data".into()));
        }
    };
    let target = settings
        .document_server(Utc::now(), state.config.demo_server.as_ref())
        .ok_or(AppError::SettingsNotConfigured)?;

    Ok(PreparedBoard { board_id, target })
}

/// `GET /api/files?bid=&cursor=`
pub async fn list(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    RequestCancellation(cancel): RequestCancellation,
    Query(query): Query<FilesQuery>,
) -> AppResult<Json<DocumentsResponse>> {
    let board = prepare(&state, &claims, query.bid).await?;
    let cursor = query.cursor.filter(|c| !c.trim().is_empty());

    let page = state
        .tokens
        .call(&claims.team, &claims.sub, |token| {
            let (platform, cancel, board_id, cursor) =
                (&state.platform, &cancel, &board.board_id, &cursor);
            async move {
                platform
                    .list_documents(board_id, cursor.as_deref(), &token, cancel)
                    .await
            }
        })
        .await
        .map_err(|e| board_error(e, "fetch board documents"))?;

    Ok(Json(DocumentsResponse {
        data: page.items.into_iter().map(DocumentEntry::from).collect(),
        cursor: page.cursor,
    }))
}

/// `POST /api/files/create`
///
/// Places a blank document of the requested type on the board.
pub async fn create(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    RequestCancellation(cancel): RequestCancellation,
    Json(body): Json<CreateFileRequest>,
) -> AppResult<Json<FileCreatedResponse>> {
    let board = prepare(&state, &claims, body.board_id).await?;

    let file_type = body.file_type.trim().to_ascii_lowercase();
    if !TEMPLATE_TYPES.contains(&file_type.as_str()) {
        return Err(AppError::BadRequest(format!(
            "unsupported document type {file_type:?}"
        )));
    }
    let title = document_title(&body.name, &file_type)
        .ok_or_else(|| AppError::BadRequest("document name is missing".into()))?;

    let templates = state
        .config
        .templates_url
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("document creation is not configured".into()))?;
    let url = templates
        .join(&format!("new.{file_type}"))
        .map_err(|e| AppError::Internal(format!("template URL: {e}")))?;
    let document = NewDocument {
        title,
        url: url.to_string(),
    };

    let created = state
        .tokens
        .call(&claims.team, &claims.sub, |token| {
            let (platform, cancel, board_id, document) =
                (&state.platform, &cancel, &board.board_id, &document);
            async move {
                platform
                    .create_document(board_id, document, &token, cancel)
                    .await
            }
        })
        .await
        .map_err(|e| board_error(e, "create the document"))?;

    info!(
        board_id = %board.board_id,
        item_id = %created.id,
        user_id = %claims.sub,
        "document created"
    );
    Ok(Json(FileCreatedResponse::from(created)))
}

/// `GET /api/files/convert?bid=&fid=&outputtype=`
///
/// Looks the document up on the board and has the board's document server
/// convert it. The caller polls until `endConvert` is set.
pub async fn convert(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    RequestCancellation(cancel): RequestCancellation,
    Query(query): Query<ConvertQuery>,
) -> AppResult<Json<ConvertResponse>> {
    let PreparedBoard { board_id, target } = prepare(&state, &claims, query.bid).await?;
    let file_id = non_empty(query.fid, "file id")?;
    let output_type = query.outputtype.trim().to_ascii_lowercase();

    let document = state
        .tokens
        .call(&claims.team, &claims.sub, |token| {
            let (platform, cancel, board_id, file_id) = (&state.platform, &cancel, &board_id, &file_id);
            async move {
                platform
                    .get_document(board_id, file_id, &token, cancel)
                    .await
            }
        })
        .await
        .map_err(|e| match e {
            PlatformError::NotFound => AppError::NotFound("document".into()),
            other => AppError::from(other),
        })?;

    let file_type = extension(&document.title)
        .ok_or_else(|| AppError::BadRequest("document has no file extension".into()))?;
    if file_type == output_type {
        return Err(AppError::BadRequest(format!("document is already {output_type}")));
    }

    let request = ConvertRequest {
        is_async: true,
        filetype: file_type,
        outputtype: output_type,
        key: format!("{board_id}_{file_id}"),
        title: document.title,
        url: document.document_url,
    };
    let result = state
        .docserver
        .convert_file(&cancel, &target, &request)
        .await?;
    if result.end_convert {
        info!(board_id = %board_id, file_id = %file_id, user_id = %claims.sub, "document converted");
    }

    Ok(Json(ConvertResponse {
        end_convert: result.end_convert,
        percent: result.percent,
        file_url: result.file_url,
        file_type: result.file_type,
    }))
}

/// Platform failures on board document calls. Only a lost grant, an
/// unreachable token endpoint and cancellation keep their own status.
fn board_error(e: PlatformError, action: &str) -> AppError {
    match e {
        PlatformError::Unauthorized | PlatformError::Token(OAuthError::TokenMissing) => {
            AppError::TokenMissing
        }
        PlatformError::Token(OAuthError::Unavailable(msg)) => AppError::UpstreamUnavailable(msg),
        PlatformError::Cancelled => AppError::Timeout,
        other => {
            warn!(error = %other, action, "board document call failed");
            AppError::BadRequest(format!("failed to {action}"))
        }
    }
}

fn non_empty(value: Option<String>, what: &str) -> AppResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("{what} parameter is missing")))
}

/// Title for a new document: path separators escaped, extension appended
/// unless the name already carries it.
fn document_title(name: &str, file_type: &str) -> Option<String> {
    let name = name.trim().replace(['\\', '/'], ":");
    if name.is_empty() {
        return None;
    }
    if extension(&name).as_deref() == Some(file_type) {
        Some(name)
    } else {
        Some(format!("{name}.{file_type}"))
    }
}

/// Lowercased extension of a file name.
fn extension(title: &str) -> Option<String> {
    let (stem, ext) = title.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_taken_from_the_title() {
        assert_eq!(extension("Budget 2025.XLSX").as_deref(), Some("xlsx"));
        assert_eq!(extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension("README"), None);
        assert_eq!(extension(".hidden"), None);
        assert_eq!(extension("trailing."), None);
    }

    #[test]
    fn new_document_titles() {
        assert_eq!(document_title("Plan", "docx").as_deref(), Some("Plan.docx"));
        assert_eq!(document_title(" Plan.DOCX ", "docx").as_deref(), Some("Plan.DOCX"));
        assert_eq!(document_title("Q1/Q2", "xlsx").as_deref(), Some("Q1:Q2.xlsx"));
        assert_eq!(document_title("   ", "pptx"), None);
    }

    #[test]
    fn lost_grant_keeps_its_status() {
        assert_eq!(
            board_error(PlatformError::Unauthorized, "x").code(),
            "token_missing"
        );
        assert_eq!(
            board_error(PlatformError::Rejected("HTTP 422".into()), "x").status(),
            axum::http::StatusCode::BAD_REQUEST
        );
    }
}
