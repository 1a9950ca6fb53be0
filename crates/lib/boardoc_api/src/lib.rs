//! # boardoc_api
//!
//! HTTP API library for Boardoc.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::any::Any;
use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use boardoc_core::auth::jwt::TokenCodec;
use boardoc_core::auth::platform::PlatformVerifier;
use boardoc_core::docserver::DocServerClient;
use boardoc_core::oauth::store::OAuthTokenStore;
use boardoc_core::platform::PlatformClient;
use boardoc_core::rate_limit::RateLimiter;
use boardoc_core::settings::SettingsStore;
use sqlx::PgPool;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{error, warn};

use crate::config::{ApiConfig, CorsConfig};
use crate::error::AppError;
use crate::handlers::{authorize, callback, editor, fallback, files, health, oauth, settings};
use crate::middleware::auth::{
    EditorAuthenticator, PlatformSessionAuthenticator, TokenAuthenticator, authenticate,
};
use crate::middleware::cancellation::propagate_cancellation;
use crate::middleware::rate_limit::rate_limit;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub codec: Arc<TokenCodec>,
    pub tokens: Arc<OAuthTokenStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub platform: Arc<dyn PlatformClient>,
    pub platform_verifier: Arc<dyn PlatformVerifier>,
    pub docserver: DocServerClient,
    pub rate_limiter: RateLimiter,
}

/// Run embedded database migrations.
///
/// Delegates to `boardoc_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    boardoc_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
///
/// Inbound order: panic guard, CORS, cancellation and request ceiling,
/// rate limit, then the route's authentication strategy.
pub fn router(state: AppState) -> Router {
    let token_auth = Arc::new(TokenAuthenticator::new(state.codec.clone()));
    let session_auth = Arc::new(PlatformSessionAuthenticator::new(
        state.platform_verifier.clone(),
        state.codec.clone(),
    ));
    let editor_auth = Arc::new(EditorAuthenticator::new(
        TokenAuthenticator::new(state.codec.clone()),
        state.tokens.clone(),
        state.settings.clone(),
        state.platform.clone(),
        state.config.demo_server.clone(),
    ));

    // Own session token
    let token_routes = Router::new()
        .route(
            "/api/settings",
            get(settings::get_settings).post(settings::post_settings),
        )
        .route("/api/files", get(files::list))
        .route("/api/files/create", post(files::create))
        .route("/api/files/convert", get(files::convert))
        .route_layer(from_fn_with_state(
            token_auth,
            authenticate::<TokenAuthenticator>,
        ));

    // Platform SDK assertion
    let session_routes = Router::new()
        .route("/api/authorize", get(authorize::authorize))
        .route_layer(from_fn_with_state(
            session_auth,
            authenticate::<PlatformSessionAuthenticator>,
        ));

    let editor_routes = Router::new()
        .route("/api/editor", get(editor::editor))
        .route_layer(from_fn_with_state(
            editor_auth,
            authenticate::<EditorAuthenticator>,
        ));

    let public = Router::new()
        .route("/health", get(health::health))
        .route("/api/callback", post(callback::callback))
        .route("/api/oauth", get(oauth::oauth));

    Router::new()
        .merge(public)
        .merge(token_routes)
        .merge(session_routes)
        .merge(editor_routes)
        .fallback(fallback::fallback)
        .layer(from_fn_with_state(state.rate_limiter.clone(), rate_limit))
        .layer(from_fn_with_state(
            state.config.request_timeout,
            propagate_cancellation,
        ))
        .layer(cors_layer(&state.config.cors))
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let any = config.allow_origins.iter().any(|o| o == "*");
    let origins = if any {
        // Credentials forbid a literal wildcard; echo the caller's origin.
        AllowOrigin::mirror_request()
    } else {
        let list: Vec<HeaderValue> = config
            .allow_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(list)
    };
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(config.allow_credentials)
        .max_age(config.max_age)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(detail, "handler panicked");
    AppError::Internal("handler panicked".into()).into_response()
}
