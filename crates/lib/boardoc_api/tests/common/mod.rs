//! Shared fixtures: an app wired to in-memory stores and fake upstreams.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use boardoc_api::{AppState, config::ApiConfig};
use boardoc_core::auth::jwt::TokenCodec;
use boardoc_core::auth::platform::SignedAssertionVerifier;
use boardoc_core::docserver::DocServerClient;
use boardoc_core::models::auth::TokenRecord;
use boardoc_core::models::board::{
    BoardMember, BoardRole, DocumentItem, DocumentPage, NewDocument, UserInfo,
};
use boardoc_core::models::settings::Settings;
use boardoc_core::oauth::queries::{MemoryTokenRepository, TokenRepository};
use boardoc_core::oauth::store::OAuthTokenStore;
use boardoc_core::oauth::{OAuthError, OAuthProvider, TokenGrant};
use boardoc_core::platform::{PlatformClient, PlatformError};
use boardoc_core::rate_limit::{
    CounterStore, RateLimitConfig, RateLimitError, RateLimitFailureMode, RateLimiter,
};
use boardoc_core::settings::{MemorySettingsStore, SettingsError, SettingsStore, SettingsUpdate};
use boardoc_core::transport::{RetryableTransport, TransportConfig};
use chrono::Utc;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

pub const TEAM: &str = "team-1";
pub const USER: &str = "user-1";
pub const PLATFORM_SECRET: &str = "platform-client-secret";
pub const MARKETING_URL: &str = "https://whiteboard.example/marketplace";
pub const INSTALL_REDIRECT: &str = "https://whiteboard.example/installed";

/// Boards whose membership lookup misbehaves.
pub const PANIC_BOARD: &str = "board-panic";
pub const SLOW_BOARD: &str = "board-slow";

pub const DS_SECRET: &str = "ds-secret";
pub const TEMPLATES_URL: &str = "https://cdn.example/templates";

/// Platform fake: roles per board, counted lookups, a fixed set of board
/// documents served two per page.
#[derive(Default)]
pub struct FakePlatform {
    pub roles: HashMap<String, String>,
    pub member_calls: AtomicU32,
    pub documents: Vec<DocumentItem>,
    /// Documents placed on boards through `create_document`.
    pub created: Mutex<Vec<NewDocument>>,
    /// Cancellation tokens handed to membership lookups.
    pub cancels: Mutex<Vec<CancellationToken>>,
}

impl FakePlatform {
    pub fn with_role(board: &str, role: &str) -> Self {
        Self {
            roles: HashMap::from([(board.to_string(), role.to_string())]),
            ..Default::default()
        }
    }

    pub fn documents(mut self, titles: &[&str]) -> Self {
        self.documents = titles
            .iter()
            .enumerate()
            .map(|(i, title)| DocumentItem {
                id: format!("doc-{i}"),
                title: title.to_string(),
                document_url: format!("https://files.example/{i}"),
                created_at: None,
                modified_at: None,
            })
            .collect();
        self
    }

    pub fn calls(&self) -> u32 {
        self.member_calls.load(Ordering::SeqCst)
    }

    pub fn last_cancel(&self) -> Option<CancellationToken> {
        self.cancels.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    async fn get_board_member(
        &self,
        board_id: &str,
        member_id: &str,
        _access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<BoardMember, PlatformError> {
        self.member_calls.fetch_add(1, Ordering::SeqCst);
        self.cancels.lock().unwrap().push(cancel.clone());
        if board_id == PANIC_BOARD {
            panic!("membership lookup exploded");
        }
        if board_id == SLOW_BOARD {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        self.roles
            .get(board_id)
            .map(|role| BoardMember {
                id: member_id.to_string(),
                name: None,
                role: BoardRole::parse(role),
            })
            .ok_or(PlatformError::NotFound)
    }

    async fn get_user_info(
        &self,
        _access_token: &str,
        _cancel: &CancellationToken,
    ) -> Result<UserInfo, PlatformError> {
        Ok(UserInfo {
            user_id: USER.to_string(),
            user_name: None,
            team_id: TEAM.to_string(),
        })
    }

    async fn get_document(
        &self,
        _board_id: &str,
        item_id: &str,
        _access_token: &str,
        _cancel: &CancellationToken,
    ) -> Result<DocumentItem, PlatformError> {
        Ok(DocumentItem {
            id: item_id.to_string(),
            title: "Budget.xlsx".to_string(),
            document_url: "https://files.example/budget".to_string(),
            created_at: None,
            modified_at: None,
        })
    }

    async fn list_documents(
        &self,
        _board_id: &str,
        cursor: Option<&str>,
        _access_token: &str,
        _cancel: &CancellationToken,
    ) -> Result<DocumentPage, PlatformError> {
        let start = match cursor {
            None => 0,
            Some(c) => c.parse().map_err(|_| PlatformError::Rejected("bad cursor".into()))?,
        };
        let end = (start + 2).min(self.documents.len());
        Ok(DocumentPage {
            items: self.documents[start.min(end)..end].to_vec(),
            cursor: (end < self.documents.len()).then(|| end.to_string()),
        })
    }

    async fn create_document(
        &self,
        _board_id: &str,
        document: &NewDocument,
        _access_token: &str,
        _cancel: &CancellationToken,
    ) -> Result<DocumentItem, PlatformError> {
        self.created.lock().unwrap().push(document.clone());
        Ok(DocumentItem {
            id: "doc-new".to_string(),
            title: document.title.clone(),
            document_url: document.url.clone(),
            created_at: Some(Utc::now()),
            modified_at: Some(Utc::now()),
        })
    }
}

/// Settings store whose backend is down.
pub struct BrokenSettings;

#[async_trait]
impl SettingsStore for BrokenSettings {
    async fn find(&self, _team_id: &str, _board_id: &str) -> Result<Settings, SettingsError> {
        Err(SettingsError::Storage("connection refused".into()))
    }

    async fn save(
        &self,
        _team_id: &str,
        _board_id: &str,
        _update: SettingsUpdate,
    ) -> Result<Settings, SettingsError> {
        Err(SettingsError::Storage("connection refused".into()))
    }
}

/// Rate limit counters whose backend is down.
pub struct BrokenCounters;

#[async_trait]
impl CounterStore for BrokenCounters {
    async fn hit(&self, _key: &str, _window: Duration) -> Result<(u32, Duration), RateLimitError> {
        Err(RateLimitError::Store("connection reset by peer".into()))
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

/// Provider fake that hands out the same grant for every code.
pub struct FakeProvider;

#[async_trait]
impl OAuthProvider for FakeProvider {
    async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> Result<TokenGrant, OAuthError> {
        if code != "good-code" {
            return Err(OAuthError::Provider("invalid_grant".into()));
        }
        Ok(TokenGrant {
            access_token: "access-new".into(),
            refresh_token: Some("refresh-new".into()),
            expires_in: 3600,
            user_id: Some(USER.into()),
            team_id: Some(TEAM.into()),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, OAuthError> {
        Err(OAuthError::Provider("refresh not expected".into()))
    }
}

pub struct TestApp {
    pub state: AppState,
    pub repo: Arc<MemoryTokenRepository>,
    pub settings: Arc<MemorySettingsStore>,
    pub platform: Arc<FakePlatform>,
}

pub struct TestAppBuilder {
    platform: FakePlatform,
    max_requests: u32,
    request_timeout: Duration,
    broken_settings: bool,
    broken_limiter: Option<RateLimitFailureMode>,
}

impl TestAppBuilder {
    pub fn platform(mut self, platform: FakePlatform) -> Self {
        self.platform = platform;
        self
    }

    pub fn max_requests(mut self, max: u32) -> Self {
        self.max_requests = max;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Serve settings from a store that fails every call.
    pub fn broken_settings(mut self) -> Self {
        self.broken_settings = true;
        self
    }

    /// Count requests in a store that fails every call.
    pub fn broken_limiter(mut self, mode: RateLimitFailureMode) -> Self {
        self.broken_limiter = Some(mode);
        self
    }

    pub fn build(self) -> TestApp {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("JWT_SECRET", "test-jwt-secret"),
            ("ENCRYPTION_KEY", "test-encryption-key"),
            ("PLATFORM_CLIENT_ID", "client-id"),
            ("PLATFORM_CLIENT_SECRET", PLATFORM_SECRET),
            ("PLATFORM_REDIRECT_URI", "https://boardoc.example/api/oauth"),
            ("PLATFORM_INSTALL_REDIRECT", INSTALL_REDIRECT),
            ("PLATFORM_MARKETING_URL", MARKETING_URL),
            ("RATE_LIMIT_BACKEND", "memory"),
            ("DOCUMENT_TEMPLATES_URL", TEMPLATES_URL),
        ]);
        let mut config =
            ApiConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).expect("config");
        config.request_timeout = self.request_timeout;

        let repo = Arc::new(MemoryTokenRepository::new());
        let settings = Arc::new(MemorySettingsStore::new());
        let platform = Arc::new(self.platform);
        let tokens = Arc::new(OAuthTokenStore::new(repo.clone(), Arc::new(FakeProvider)));
        let transport = RetryableTransport::new(TransportConfig {
            deadline: Duration::from_secs(2),
            ..Default::default()
        });

        let limits = RateLimitConfig {
            max_requests: self.max_requests,
            failure_mode: self.broken_limiter.unwrap_or_default(),
            ..Default::default()
        };
        let rate_limiter = match self.broken_limiter {
            Some(_) => RateLimiter::with_store(limits, Arc::new(BrokenCounters)),
            None => RateLimiter::memory(limits),
        };
        let settings_store: Arc<dyn SettingsStore> = if self.broken_settings {
            Arc::new(BrokenSettings)
        } else {
            settings.clone()
        };

        let state = AppState {
            codec: Arc::new(TokenCodec::new(config.jwt_secret.as_bytes())),
            tokens,
            settings: settings_store,
            platform: platform.clone(),
            platform_verifier: Arc::new(SignedAssertionVerifier::new(PLATFORM_SECRET.as_bytes())),
            docserver: DocServerClient::new(transport),
            rate_limiter,
            config: Arc::new(config),
        };
        TestApp {
            state,
            repo,
            settings,
            platform,
        }
    }
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            platform: FakePlatform::default(),
            max_requests: 1_000,
            request_timeout: Duration::from_secs(15),
            broken_settings: false,
            broken_limiter: None,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        boardoc_api::router(self.state.clone())
            .oneshot(req)
            .await
            .expect("request")
    }

    /// Store a valid grant for the default user.
    pub async fn grant(&self) {
        self.repo
            .save(&TokenRecord {
                team_id: TEAM.into(),
                user_id: USER.into(),
                access_token: "access".into(),
                refresh_token: "refresh".into(),
                expires_at: Utc::now() + chrono::Duration::hours(1),
            })
            .await
            .expect("save grant");
    }

    pub async fn configure_board(&self, board: &str) {
        self.configure_board_at(board, "https://ds.example").await;
    }

    pub async fn configure_board_at(&self, board: &str, address: &str) {
        let update = SettingsUpdate::new()
            .address(address)
            .header("Authorization")
            .secret(DS_SECRET);
        self.settings
            .save(TEAM, board, update)
            .await
            .expect("save settings");
    }

    /// Session token for the default user.
    pub fn session(&self) -> String {
        self.state
            .codec
            .issue_session(USER, TEAM, Utc::now())
            .expect("issue session")
            .0
    }
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(t) = token {
        builder = builder.header("authorization", format!("Bearer {t}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn json_body(resp: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse JSON")
}

/// Platform SDK id token for the default user.
pub fn platform_assertion(secret: &str) -> String {
    let claims = json!({
        "user": USER,
        "team": TEAM,
        "exp": Utc::now().timestamp() + 300,
    });
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

/// Local document server answering the version command and converting
/// requests signed with [`DS_SECRET`].
pub async fn spawn_docserver() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new()
        .route(
            "/command",
            post(|| async { Json(json!({"error": 0, "version": "8.3.1"})) }),
        )
        .route("/converter", post(converter));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn converter(Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    let token = body["token"].as_str().ok_or(StatusCode::BAD_REQUEST)?;
    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    let payload = jsonwebtoken::decode::<Value>(
        token,
        &jsonwebtoken::DecodingKey::from_secret(DS_SECRET.as_bytes()),
        &validation,
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?
    .claims;

    let key = payload["key"].as_str().unwrap_or_default();
    let output = payload["outputtype"].as_str().unwrap_or_default();
    Ok(Json(json!({
        "endConvert": true,
        "fileUrl": format!("https://ds.example/cache/{key}.{output}"),
        "fileType": payload["outputtype"],
        "percent": 100,
        "error": 0,
    })))
}
