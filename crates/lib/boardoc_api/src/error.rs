//! Application error types.

use std::time::Duration;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use boardoc_core::auth::CodecError;
use boardoc_core::authz::AccessError;
use boardoc_core::docserver::DocServerError;
use boardoc_core::oauth::OAuthError;
use boardoc_core::platform::PlatformError;
use boardoc_core::rate_limit::RateLimitError;
use boardoc_core::settings::SettingsError;
use boardoc_core::transport::TransportError;
use thiserror::Error;
use tracing::{debug, error};

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Authorization with the platform is required")]
    TokenMissing,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Document server settings are not configured for this board")]
    SettingsNotConfigured,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Too many requests")]
    RateLimited { retry_after: Duration },

    #[error("Upstream rejected the request: {0}")]
    UpstreamRejected(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated | AppError::TokenMissing => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::SettingsNotConfigured => StatusCode::CONFLICT,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::UpstreamRejected(_) => StatusCode::BAD_GATEWAY,
            AppError::UpstreamUnavailable(_) | AppError::Unavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "unauthenticated",
            AppError::TokenMissing => "token_missing",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::SettingsNotConfigured => "settings_not_configured",
            AppError::BadRequest(_) => "bad_request",
            AppError::Validation(_) => "validation_error",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::UpstreamRejected(_) => "upstream_rejected",
            AppError::UpstreamUnavailable(_) => "upstream_unavailable",
            AppError::Unavailable(_) => "service_unavailable",
            AppError::Timeout => "request_timeout",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Internal(detail) => {
                error!(detail = %detail, "internal error");
                "Internal server error".to_string()
            }
            AppError::UpstreamRejected(detail) | AppError::UpstreamUnavailable(detail) => {
                // Upstream detail stays in the logs.
                debug!(detail = %detail, code = self.code(), "upstream failure");
                match self {
                    AppError::UpstreamRejected(_) => "Upstream service rejected the request",
                    _ => "Upstream service is unavailable",
                }
                .to_string()
            }
            other => other.to_string(),
        };
        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message,
        });
        let mut response = (self.status(), body).into_response();
        if let AppError::RateLimited { retry_after } = self {
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        response
    }
}

impl From<CodecError> for AppError {
    fn from(e: CodecError) -> Self {
        // The response never says which check failed.
        debug!(reason = %e, "token rejected");
        match e {
            CodecError::Encode(msg) => AppError::Internal(msg),
            _ => AppError::Unauthenticated,
        }
    }
}

impl From<OAuthError> for AppError {
    fn from(e: OAuthError) -> Self {
        match e {
            OAuthError::TokenMissing => AppError::TokenMissing,
            OAuthError::Provider(msg) => AppError::UpstreamRejected(msg),
            OAuthError::Unavailable(msg) => AppError::UpstreamUnavailable(msg),
            OAuthError::Storage(msg) => AppError::Internal(msg),
        }
    }
}

impl From<PlatformError> for AppError {
    fn from(e: PlatformError) -> Self {
        match e {
            // Rejected even after a refresh: the grant is no longer usable.
            PlatformError::Unauthorized => AppError::TokenMissing,
            PlatformError::NotFound => AppError::NotFound("platform resource".into()),
            PlatformError::Rejected(msg) => AppError::UpstreamRejected(msg),
            PlatformError::Unavailable(msg) => AppError::UpstreamUnavailable(msg),
            PlatformError::Cancelled => AppError::Timeout,
            PlatformError::Token(e) => AppError::from(e),
        }
    }
}

impl From<AccessError> for AppError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::Forbidden { .. } => {
                AppError::Forbidden("Only board owners can access this endpoint".into())
            }
            AccessError::NotMember => AppError::NotFound("board".into()),
            AccessError::Token(e) => AppError::from(e),
            AccessError::Platform(e) => AppError::from(e),
        }
    }
}

impl From<SettingsError> for AppError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::NotFound => AppError::SettingsNotConfigured,
            SettingsError::Storage(msg) => AppError::Internal(msg),
        }
    }
}

impl From<TransportError> for AppError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Cancelled { .. } => AppError::Timeout,
            TransportError::Invalid(e) => AppError::Internal(e.to_string()),
            TransportError::Rejected { .. } | TransportError::Decode(_) => {
                AppError::UpstreamRejected(e.to_string())
            }
            TransportError::Exhausted { .. } | TransportError::DeadlineExceeded { .. } => {
                AppError::UpstreamUnavailable(e.to_string())
            }
        }
    }
}

impl From<DocServerError> for AppError {
    fn from(e: DocServerError) -> Self {
        match e {
            DocServerError::Address(_) | DocServerError::Header(_) => {
                AppError::BadRequest(format!("document server settings are invalid: {e}"))
            }
            DocServerError::Signing(msg) => AppError::Internal(msg),
            DocServerError::Conversion(code) => {
                AppError::UpstreamRejected(format!("conversion error code {code}"))
            }
            DocServerError::Transport(e) => AppError::from(e),
        }
    }
}

impl From<RateLimitError> for AppError {
    fn from(e: RateLimitError) -> Self {
        AppError::Unavailable(e.to_string())
    }
}
