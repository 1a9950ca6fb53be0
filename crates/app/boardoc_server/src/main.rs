//! Boardoc API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use boardoc_api::AppState;
use boardoc_api::config::ApiConfig;
use boardoc_core::auth::jwt::TokenCodec;
use boardoc_core::auth::platform::SignedAssertionVerifier;
use boardoc_core::crypto::SecretBox;
use boardoc_core::docserver::DocServerClient;
use boardoc_core::oauth::provider::HttpOAuthProvider;
use boardoc_core::oauth::queries::PgTokenRepository;
use boardoc_core::oauth::store::OAuthTokenStore;
use boardoc_core::platform::rest::RestPlatformClient;
use boardoc_core::rate_limit::RateLimiter;
use boardoc_core::settings::queries::PgSettingsStore;
use boardoc_core::transport::RetryableTransport;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

/// CLI arguments. Everything else is read from the environment.
#[derive(Parser, Debug)]
#[command(name = "boardoc_server", about = "Boardoc API server")]
struct Args {
    /// Address to listen on; overrides `BIND_ADDR`.
    #[arg(long)]
    bind_addr: Option<String>,

    /// PostgreSQL connection URL; overrides `DATABASE_URL`.
    #[arg(long)]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| {
                    tracing_subscriber::EnvFilter::try_new("info,boardoc_api=debug,boardoc_core=debug")
                })?,
        )
        .init();

    let args = Args::parse();
    let mut config = ApiConfig::from_env()?;
    if let Some(bind_addr) = args.bind_addr {
        config.bind_addr = bind_addr;
    }
    if let Some(database_url) = args.database_url {
        config.database_url = database_url;
    }
    info!(bind_addr = %config.bind_addr, ?config, "starting boardoc_server");

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&config.database_url)
        .await?;

    info!("running database migrations");
    boardoc_api::migrate(&pool).await?;

    // Fails startup when the shared store is unreachable.
    let rate_limiter = RateLimiter::connect(config.rate_limit.clone()).await?;

    let secrets = SecretBox::new(&config.encryption_key);
    let transport = RetryableTransport::new(config.transport.clone());
    let provider = HttpOAuthProvider::new(
        transport.clone(),
        config.platform.token_url.clone(),
        config.platform.client_id.clone(),
        config.platform.client_secret.clone(),
    );
    let tokens = OAuthTokenStore::new(
        Arc::new(PgTokenRepository::new(pool.clone(), secrets.clone())),
        Arc::new(provider),
    );
    let codec = TokenCodec::new(config.jwt_secret.as_bytes())
        .with_cookie_lifetime(chrono::Duration::from_std(config.cookie_lifetime)?);

    if config.demo_server.is_none() {
        warn!("no demo document server configured, trials are disabled");
    }

    let state = AppState {
        codec: Arc::new(codec),
        tokens: Arc::new(tokens),
        settings: Arc::new(PgSettingsStore::new(pool, secrets)),
        platform: Arc::new(RestPlatformClient::new(
            transport.clone(),
            config.platform.api_url.clone(),
        )),
        platform_verifier: Arc::new(SignedAssertionVerifier::new(
            config.platform.client_secret.as_bytes(),
        )),
        docserver: DocServerClient::new(transport),
        rate_limiter,
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind(&state.config.bind_addr).await?;
    let local_addr = listener.local_addr()?;
    let app = boardoc_api::router(state);

    info!(addr = %local_addr, "REST API listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
