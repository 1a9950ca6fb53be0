//! API server configuration.

use std::time::Duration;

use boardoc_core::auth::jwt::COOKIE_LIFETIME_SECS;
use boardoc_core::models::settings::DocServerTarget;
use boardoc_core::rate_limit::{RateLimitBackend, RateLimitConfig, RateLimitFailureMode};
use boardoc_core::transport::TransportConfig;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// CORS policy for browser callers embedded in the platform.
#[derive(Clone, Debug)]
pub struct CorsConfig {
    /// Allowed origins; `*` allows any.
    pub allow_origins: Vec<String>,
    pub allow_credentials: bool,
    pub max_age: Duration,
}

/// Whiteboard platform app registration.
#[derive(Clone)]
pub struct PlatformConfig {
    pub api_url: Url,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Redirect URI registered for the OAuth consent flow.
    pub redirect_uri: String,
    /// Where users land once the app is installed.
    pub install_redirect: String,
    /// Where unknown routes send users.
    pub marketing_url: String,
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("api_url", &self.api_url.as_str())
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("install_redirect", &self.install_redirect)
            .field("marketing_url", &self.marketing_url)
            .finish_non_exhaustive()
    }
}

/// Configuration for the API server. Read once at startup, never mutated.
#[derive(Clone)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "0.0.0.0:8080").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Signing secret for session and editor tokens.
    pub jwt_secret: String,
    /// Passphrase for encrypting stored credentials.
    pub encryption_key: String,
    pub cookie_lifetime: Duration,
    /// Ceiling on the handling time of any request.
    pub request_timeout: Duration,
    pub cors: CorsConfig,
    pub rate_limit: RateLimitConfig,
    pub transport: TransportConfig,
    pub platform: PlatformConfig,
    /// Shared document server for teams on a trial.
    pub demo_server: Option<DocServerTarget>,
    /// Directory URL holding the blank `new.docx`, `new.xlsx` and
    /// `new.pptx` new documents are created from.
    pub templates_url: Option<Url>,
}

impl ApiConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable                   | Default                                   |
    /// |----------------------------|-------------------------------------------|
    /// | `BIND_ADDR`                | `0.0.0.0:8080`                            |
    /// | `DATABASE_URL`             | `postgres://localhost:5432/boardoc`       |
    /// | `JWT_SECRET`               | required                                  |
    /// | `ENCRYPTION_KEY`           | required                                  |
    /// | `COOKIE_LIFETIME_SECS`     | `86400`                                   |
    /// | `REQUEST_TIMEOUT_SECS`     | `15`                                      |
    /// | `CORS_ALLOW_ORIGINS`       | `*` (comma-separated)                     |
    /// | `CORS_ALLOW_CREDENTIALS`   | `true`                                    |
    /// | `CORS_MAX_AGE_SECS`        | `600`                                     |
    /// | `RATE_LIMIT_BACKEND`       | `redis`                                   |
    /// | `REDIS_URL`                | `redis://127.0.0.1:6379/`                 |
    /// | `RATE_LIMIT_MAX_REQUESTS`  | `100`                                     |
    /// | `RATE_LIMIT_WINDOW_SECS`   | `60`                                      |
    /// | `RATE_LIMIT_FAILURE_MODE`  | `closed`                                  |
    /// | `TRANSPORT_MAX_ATTEMPTS`   | `3`                                       |
    /// | `TRANSPORT_DEADLINE_MS`    | `5000`                                    |
    /// | `PLATFORM_API_URL`         | `https://api.miro.com/`                   |
    /// | `PLATFORM_TOKEN_URL`       | `https://api.miro.com/v1/oauth/token`     |
    /// | `PLATFORM_CLIENT_ID`       | required                                  |
    /// | `PLATFORM_CLIENT_SECRET`   | required                                  |
    /// | `PLATFORM_REDIRECT_URI`    | required                                  |
    /// | `PLATFORM_INSTALL_REDIRECT`| `https://miro.com/app-install-completed/` |
    /// | `PLATFORM_MARKETING_URL`   | `https://miro.com`                        |
    /// | `DEMO_DOCSERVER_ADDRESS`, `_HEADER`, `_SECRET` | unset (no trial)      |
    /// | `DOCUMENT_TEMPLATES_URL`   | unset (document creation disabled)        |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env), reading values from `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let or = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let rate_limit_backend = match or("RATE_LIMIT_BACKEND", "redis").to_ascii_lowercase().as_str() {
            "memory" => RateLimitBackend::Memory,
            "redis" => RateLimitBackend::Redis {
                url: or("REDIS_URL", "redis://127.0.0.1:6379/"),
            },
            other => {
                return Err(ConfigError::Invalid {
                    name: "RATE_LIMIT_BACKEND",
                    reason: format!("expected redis or memory, got {other}"),
                });
            }
        };
        let failure_mode: RateLimitFailureMode = or("RATE_LIMIT_FAILURE_MODE", "closed")
            .parse()
            .map_err(|reason| ConfigError::Invalid {
                name: "RATE_LIMIT_FAILURE_MODE",
                reason,
            })?;

        let api_url = or("PLATFORM_API_URL", "https://api.miro.com/");
        let api_url = Url::parse(&api_url).map_err(|e| ConfigError::Invalid {
            name: "PLATFORM_API_URL",
            reason: e.to_string(),
        })?;

        let demo_server = match (
            get("DEMO_DOCSERVER_ADDRESS"),
            get("DEMO_DOCSERVER_HEADER"),
            get("DEMO_DOCSERVER_SECRET"),
        ) {
            (Some(address), Some(header), Some(secret)) => Some(DocServerTarget {
                address,
                header,
                secret,
            }),
            (None, _, _) => None,
            _ => {
                return Err(ConfigError::Invalid {
                    name: "DEMO_DOCSERVER_ADDRESS",
                    reason: "demo server needs an address, header and secret".into(),
                });
            }
        };

        let templates_url = get("DOCUMENT_TEMPLATES_URL")
            .map(|raw| {
                // Join relative to the directory, not its last segment.
                let dir = if raw.ends_with('/') { raw } else { format!("{raw}/") };
                Url::parse(&dir)
            })
            .transpose()
            .map_err(|e| ConfigError::Invalid {
                name: "DOCUMENT_TEMPLATES_URL",
                reason: e.to_string(),
            })?;

        let defaults = TransportConfig::default();

        Ok(Self {
            bind_addr: or("BIND_ADDR", "0.0.0.0:8080"),
            database_url: or("DATABASE_URL", "postgres://localhost:5432/boardoc"),
            jwt_secret: required("JWT_SECRET")?,
            encryption_key: required("ENCRYPTION_KEY")?,
            cookie_lifetime: Duration::from_secs(parse_num(
                &get,
                "COOKIE_LIFETIME_SECS",
                COOKIE_LIFETIME_SECS as u64,
            )?),
            request_timeout: Duration::from_secs(parse_num(&get, "REQUEST_TIMEOUT_SECS", 15)?),
            cors: CorsConfig {
                allow_origins: or("CORS_ALLOW_ORIGINS", "*")
                    .split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect(),
                allow_credentials: parse_bool(&get, "CORS_ALLOW_CREDENTIALS", true)?,
                max_age: Duration::from_secs(parse_num(&get, "CORS_MAX_AGE_SECS", 600)?),
            },
            rate_limit: RateLimitConfig {
                max_requests: parse_num(&get, "RATE_LIMIT_MAX_REQUESTS", 100)?,
                window: Duration::from_secs(parse_num(&get, "RATE_LIMIT_WINDOW_SECS", 60)?),
                failure_mode,
                backend: rate_limit_backend,
            },
            transport: TransportConfig {
                max_attempts: parse_num(&get, "TRANSPORT_MAX_ATTEMPTS", defaults.max_attempts)?,
                deadline: Duration::from_millis(parse_num(
                    &get,
                    "TRANSPORT_DEADLINE_MS",
                    defaults.deadline.as_millis() as u64,
                )?),
                ..defaults
            },
            platform: PlatformConfig {
                api_url,
                token_url: or("PLATFORM_TOKEN_URL", "https://api.miro.com/v1/oauth/token"),
                client_id: required("PLATFORM_CLIENT_ID")?,
                client_secret: required("PLATFORM_CLIENT_SECRET")?,
                redirect_uri: required("PLATFORM_REDIRECT_URI")?,
                install_redirect: or(
                    "PLATFORM_INSTALL_REDIRECT",
                    "https://miro.com/app-install-completed/",
                ),
                marketing_url: or("PLATFORM_MARKETING_URL", "https://miro.com"),
            },
            demo_server,
            templates_url,
        })
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("cookie_lifetime", &self.cookie_lifetime)
            .field("request_timeout", &self.request_timeout)
            .field("cors", &self.cors)
            .field("rate_limit", &self.rate_limit)
            .field("transport", &self.transport)
            .field("platform", &self.platform)
            .field("demo_server", &self.demo_server)
            .field("templates_url", &self.templates_url.as_ref().map(Url::as_str))
            .finish_non_exhaustive()
    }
}

fn parse_num<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}

fn parse_bool<G>(get: &G, name: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no") => Ok(false),
        Some(v) => Err(ConfigError::Invalid {
            name,
            reason: format!("expected a boolean, got {v}"),
        }),
    }
}
