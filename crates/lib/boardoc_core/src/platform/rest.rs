//! REST implementation of [`PlatformClient`] over the retrying transport.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::{PlatformClient, PlatformError};
use crate::models::board::{BoardMember, DocumentItem, DocumentPage, NewDocument, UserInfo};
use crate::transport::RetryableTransport;

/// Items requested per page when listing a board.
const PAGE_SIZE: &str = "50";

#[derive(Deserialize)]
struct TokenInfo {
    user: NamedEntity,
    team: NamedEntity,
}

#[derive(Deserialize)]
struct NamedEntity {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentResponse {
    id: String,
    data: DocumentData,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    modified_at: Option<DateTime<Utc>>,
}

impl From<DocumentResponse> for DocumentItem {
    fn from(doc: DocumentResponse) -> Self {
        Self {
            id: doc.id,
            title: doc.data.title,
            document_url: doc.data.document_url,
            created_at: doc.created_at,
            modified_at: doc.modified_at,
        }
    }
}

#[derive(Deserialize)]
struct ItemsPage {
    #[serde(default)]
    data: Vec<DocumentResponse>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Serialize)]
struct CreateDocumentBody<'a> {
    data: CreateDocumentData<'a>,
}

#[derive(Serialize)]
struct CreateDocumentData<'a> {
    url: &'a str,
    title: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentData {
    #[serde(default)]
    title: String,
    document_url: String,
}

#[derive(Debug, Clone)]
pub struct RestPlatformClient {
    transport: RetryableTransport,
    base: Url,
}

impl RestPlatformClient {
    pub fn new(transport: RetryableTransport, base: Url) -> Self {
        Self { transport, base }
    }

    /// `base` with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, PlatformError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| PlatformError::Rejected("platform base URL cannot hold a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl PlatformClient for RestPlatformClient {
    async fn get_board_member(
        &self,
        board_id: &str,
        member_id: &str,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<BoardMember, PlatformError> {
        let url = self.endpoint(&["v2", "boards", board_id, "members", member_id])?;
        let member: BoardMember = self
            .transport
            .send_json(cancel, |c| c.get(url.clone()).bearer_auth(access_token))
            .await?;
        debug!(board_id, member_id, role = member.role.as_str(), "board member fetched");
        Ok(member)
    }

    async fn get_user_info(
        &self,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<UserInfo, PlatformError> {
        let url = self.endpoint(&["v1", "oauth-token"])?;
        let info: TokenInfo = self
            .transport
            .send_json(cancel, |c| c.get(url.clone()).bearer_auth(access_token))
            .await?;
        Ok(UserInfo {
            user_id: info.user.id,
            user_name: info.user.name,
            team_id: info.team.id,
        })
    }

    async fn get_document(
        &self,
        board_id: &str,
        item_id: &str,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<DocumentItem, PlatformError> {
        let url = self.endpoint(&["v2", "boards", board_id, "documents", item_id])?;
        let doc: DocumentResponse = self
            .transport
            .send_json(cancel, |c| c.get(url.clone()).bearer_auth(access_token))
            .await?;
        Ok(doc.into())
    }

    async fn list_documents(
        &self,
        board_id: &str,
        cursor: Option<&str>,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<DocumentPage, PlatformError> {
        let url = self.endpoint(&["v2", "boards", board_id, "items"])?;
        let mut query = vec![("type", "document"), ("limit", PAGE_SIZE)];
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            query.push(("cursor", cursor));
        }
        let page: ItemsPage = self
            .transport
            .send_json(cancel, |c| {
                c.get(url.clone()).query(&query).bearer_auth(access_token)
            })
            .await?;
        debug!(board_id, items = page.data.len(), more = page.cursor.is_some(), "board documents listed");
        Ok(DocumentPage {
            items: page.data.into_iter().map(DocumentItem::from).collect(),
            cursor: page.cursor.filter(|c| !c.is_empty()),
        })
    }

    async fn create_document(
        &self,
        board_id: &str,
        document: &NewDocument,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<DocumentItem, PlatformError> {
        let url = self.endpoint(&["v2", "boards", board_id, "documents"])?;
        let body = CreateDocumentBody {
            data: CreateDocumentData {
                url: &document.url,
                title: &document.title,
            },
        };
        let doc: DocumentResponse = self
            .transport
            .send_json(cancel, |c| {
                c.post(url.clone()).json(&body).bearer_auth(access_token)
            })
            .await?;
        debug!(board_id, item_id = %doc.id, "document created");
        Ok(doc.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use std::collections::HashMap;

    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use crate::models::board::BoardRole;
    use crate::transport::TransportConfig;

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer good")
    }

    async fn member(
        Path((board, member)): Path<(String, String)>,
        headers: HeaderMap,
    ) -> Result<Json<Value>, StatusCode> {
        if !authorized(&headers) {
            return Err(StatusCode::UNAUTHORIZED);
        }
        match (board.as_str(), member.as_str()) {
            ("b 1", "u1") => Ok(Json(json!({"id": "u1", "name": "Ann", "role": "OWNER"}))),
            _ => Err(StatusCode::NOT_FOUND),
        }
    }

    async fn token_info(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
        if !authorized(&headers) {
            return Err(StatusCode::UNAUTHORIZED);
        }
        Ok(Json(json!({
            "type": "user",
            "user": {"id": "u1", "name": "Ann"},
            "team": {"id": "t1", "name": "Team"},
        })))
    }

    async fn document(Path((_, item)): Path<(String, String)>) -> Json<Value> {
        Json(json!({
            "id": item,
            "data": {"title": "Budget.xlsx", "documentUrl": "https://files/budget"},
        }))
    }

    async fn items(
        Path(_): Path<String>,
        Query(query): Query<HashMap<String, String>>,
    ) -> Result<Json<Value>, StatusCode> {
        if query.get("type").map(String::as_str) != Some("document") {
            return Err(StatusCode::BAD_REQUEST);
        }
        let item = |id: &str| {
            json!({
                "id": id,
                "type": "document",
                "data": {"title": format!("{id}.docx"), "documentUrl": format!("https://files/{id}")},
                "createdAt": "2025-03-01T10:00:00Z",
                "modifiedAt": "2025-03-02T10:00:00Z",
            })
        };
        Ok(Json(match query.get("cursor").map(String::as_str) {
            None => json!({"data": [item("d1"), item("d2")], "cursor": "page-2"}),
            Some("page-2") => json!({"data": [item("d3")]}),
            Some(_) => return Err(StatusCode::BAD_REQUEST),
        }))
    }

    async fn create(
        Path(_): Path<String>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Result<(StatusCode, Json<Value>), StatusCode> {
        if !authorized(&headers) {
            return Err(StatusCode::UNAUTHORIZED);
        }
        Ok((
            StatusCode::CREATED,
            Json(json!({
                "id": "d9",
                "data": {"title": body["data"]["title"], "documentUrl": body["data"]["url"]},
                "createdAt": "2025-03-01T10:00:00Z",
                "modifiedAt": "2025-03-01T10:00:00Z",
            })),
        ))
    }

    async fn client() -> RestPlatformClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/v2/boards/{board}/members/{member}", get(member))
            .route("/v2/boards/{board}/documents/{item}", get(document))
            .route("/v2/boards/{board}/items", get(items))
            .route("/v2/boards/{board}/documents", post(create))
            .route("/v1/oauth-token", get(token_info));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let transport = RetryableTransport::new(TransportConfig {
            deadline: Duration::from_secs(2),
            ..Default::default()
        });
        RestPlatformClient::new(transport, Url::parse(&format!("http://{addr}/")).unwrap())
    }

    #[tokio::test]
    async fn member_role_is_parsed_case_insensitively() {
        let c = client().await;
        let m = c
            .get_board_member("b 1", "u1", "good", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(m.role, BoardRole::Owner);
        assert_eq!(m.name.as_deref(), Some("Ann"));
    }

    #[tokio::test]
    async fn status_codes_map_to_platform_errors() {
        let c = client().await;
        let cancel = CancellationToken::new();
        assert!(matches!(
            c.get_board_member("b 1", "u1", "bad", &cancel).await,
            Err(PlatformError::Unauthorized)
        ));
        assert!(matches!(
            c.get_board_member("b 1", "stranger", "good", &cancel).await,
            Err(PlatformError::NotFound)
        ));
    }

    #[tokio::test]
    async fn user_info_and_documents_are_mapped() {
        let c = client().await;
        let cancel = CancellationToken::new();

        let info = c.get_user_info("good", &cancel).await.unwrap();
        assert_eq!((info.user_id.as_str(), info.team_id.as_str()), ("u1", "t1"));

        let doc = c.get_document("b1", "d7", "good", &cancel).await.unwrap();
        assert_eq!(doc.id, "d7");
        assert_eq!(doc.title, "Budget.xlsx");
        assert_eq!(doc.document_url, "https://files/budget");
    }

    #[tokio::test]
    async fn documents_are_listed_page_by_page() {
        let c = client().await;
        let cancel = CancellationToken::new();

        let first = c.list_documents("b1", None, "good", &cancel).await.unwrap();
        let ids: Vec<_> = first.items.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["d1", "d2"]);
        assert_eq!(first.cursor.as_deref(), Some("page-2"));
        assert!(first.items[0].created_at.is_some());

        let last = c
            .list_documents("b1", first.cursor.as_deref(), "good", &cancel)
            .await
            .unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.cursor, None);
    }

    #[tokio::test]
    async fn created_document_is_returned() {
        let c = client().await;
        let cancel = CancellationToken::new();
        let new = NewDocument {
            title: "Plan.docx".into(),
            url: "https://templates/new.docx".into(),
        };

        let doc = c.create_document("b1", &new, "good", &cancel).await.unwrap();
        assert_eq!(doc.id, "d9");
        assert_eq!(doc.title, "Plan.docx");
        assert_eq!(doc.document_url, "https://templates/new.docx");

        assert!(matches!(
            c.create_document("b1", &new, "bad", &cancel).await,
            Err(PlatformError::Unauthorized)
        ));
    }
}
