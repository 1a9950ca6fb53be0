//! OAuth grant lifecycle: lookup, expiry-driven refresh, retry on rejection.
//!
//! Refreshes for the same `(team_id, user_id)` are single-flight. A keyed
//! async mutex serializes them, and a caller that acquired the lock after
//! another refresh finished reuses the stored result instead of spending the
//! refresh token again. The refresh itself runs on a spawned task so a
//! caller that disconnects cannot abandon it halfway.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::queries::TokenRepository;
use super::{AuthRejection, OAuthError, OAuthProvider, TokenGrant};
use crate::models::auth::TokenRecord;
use crate::platform::PlatformClient;

/// Access tokens this close to expiry are refreshed before use.
const EXPIRY_SKEW_SECS: i64 = 30;

type GrantKey = (String, String);

pub struct OAuthTokenStore {
    repo: Arc<dyn TokenRepository>,
    provider: Arc<dyn OAuthProvider>,
    inflight: Arc<DashMap<GrantKey, Arc<Mutex<()>>>>,
    skew: Duration,
}

impl OAuthTokenStore {
    pub fn new(repo: Arc<dyn TokenRepository>, provider: Arc<dyn OAuthProvider>) -> Self {
        Self {
            repo,
            provider,
            inflight: Arc::new(DashMap::new()),
            skew: Duration::seconds(EXPIRY_SKEW_SECS),
        }
    }

    /// Stored grant for the user, or [`OAuthError::TokenMissing`].
    pub async fn find(&self, team_id: &str, user_id: &str) -> Result<TokenRecord, OAuthError> {
        self.repo
            .find(team_id, user_id)
            .await?
            .ok_or(OAuthError::TokenMissing)
    }

    pub async fn save(&self, record: &TokenRecord) -> Result<(), OAuthError> {
        self.repo.save(record).await
    }

    /// A usable access token, refreshed first if it is about to expire.
    pub async fn access(&self, team_id: &str, user_id: &str) -> Result<String, OAuthError> {
        let record = self.find(team_id, user_id).await?;
        if !record.is_expired(Utc::now(), self.skew) {
            return Ok(record.access_token);
        }
        debug!(team_id, user_id, "access token expired, refreshing");
        let refreshed = self.refresh(team_id, user_id, &record.access_token).await?;
        Ok(refreshed.access_token)
    }

    /// Replace `stale_access` with a fresh grant.
    ///
    /// If another caller already replaced it, the stored record is returned
    /// as-is. A refresh the provider rejects deletes the grant and reports
    /// `TokenMissing`; an unreachable provider leaves the grant in place.
    pub async fn refresh(
        &self,
        team_id: &str,
        user_id: &str,
        stale_access: &str,
    ) -> Result<TokenRecord, OAuthError> {
        let key = (team_id.to_string(), user_id.to_string());
        let lock = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let task = RefreshTask {
            repo: self.repo.clone(),
            provider: self.provider.clone(),
            inflight: self.inflight.clone(),
            key,
            stale_access: stale_access.to_string(),
            skew: self.skew,
        };
        tokio::spawn(task.run(lock))
            .await
            .map_err(|e| OAuthError::Storage(format!("refresh task failed: {e}")))?
    }

    /// Run `op` with the user's access token. If the resource server rejects
    /// the token, refresh and run `op` exactly once more.
    pub async fn call<T, E, F, Fut>(&self, team_id: &str, user_id: &str, op: F) -> Result<T, E>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: AuthRejection + From<OAuthError>,
    {
        let token = self.access(team_id, user_id).await?;
        match op(token.clone()).await {
            Err(e) if e.is_unauthorized() => {
                debug!(team_id, user_id, "access token rejected, refreshing once");
                let refreshed = self.refresh(team_id, user_id, &token).await?;
                op(refreshed.access_token).await
            }
            other => other,
        }
    }

    /// Exchange an authorization code and persist the first grant.
    ///
    /// When the token response omits the user or team, they are looked up
    /// with the new access token.
    pub async fn complete_handshake(
        &self,
        code: &str,
        redirect_uri: &str,
        platform: &dyn PlatformClient,
        cancel: &CancellationToken,
    ) -> Result<TokenRecord, OAuthError> {
        let grant = self.provider.exchange_code(code, redirect_uri).await?;

        let (team_id, user_id) = match (&grant.team_id, &grant.user_id) {
            (Some(team), Some(user)) => (team.clone(), user.clone()),
            _ => {
                let info = platform
                    .get_user_info(&grant.access_token, cancel)
                    .await
                    .map_err(|e| OAuthError::Provider(e.to_string()))?;
                (info.team_id, info.user_id)
            }
        };

        let record = record_from_grant(&team_id, &user_id, grant, Utc::now(), None);
        self.repo.save(&record).await?;
        info!(team_id = %record.team_id, user_id = %record.user_id, "oauth grant stored");
        Ok(record)
    }
}

impl std::fmt::Debug for OAuthTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokenStore")
            .field("inflight", &self.inflight.len())
            .field("skew", &self.skew)
            .finish_non_exhaustive()
    }
}

/// Owned state for one refresh, detached from the caller.
struct RefreshTask {
    repo: Arc<dyn TokenRepository>,
    provider: Arc<dyn OAuthProvider>,
    inflight: Arc<DashMap<GrantKey, Arc<Mutex<()>>>>,
    key: GrantKey,
    stale_access: String,
    skew: Duration,
}

impl RefreshTask {
    async fn run(self, lock: Arc<Mutex<()>>) -> Result<TokenRecord, OAuthError> {
        let result = {
            let _guard = lock.lock().await;
            self.refresh_locked().await
        };
        drop(lock);
        self.inflight
            .remove_if(&self.key, |_, l| Arc::strong_count(l) == 1);
        result
    }

    async fn refresh_locked(&self) -> Result<TokenRecord, OAuthError> {
        let (team_id, user_id) = (&self.key.0, &self.key.1);
        let current = self
            .repo
            .find(team_id, user_id)
            .await?
            .ok_or(OAuthError::TokenMissing)?;

        let now = Utc::now();
        if current.access_token != self.stale_access && !current.is_expired(now, self.skew) {
            debug!(team_id, user_id, "reusing concurrent refresh");
            return Ok(current);
        }

        match self.provider.refresh(&current.refresh_token).await {
            Ok(grant) => {
                let record =
                    record_from_grant(team_id, user_id, grant, now, Some(&current.refresh_token));
                self.repo.save(&record).await?;
                info!(team_id, user_id, expires_at = %record.expires_at, "access token refreshed");
                Ok(record)
            }
            Err(OAuthError::Provider(reason)) => {
                warn!(team_id, user_id, reason = %reason, "refresh rejected, dropping grant");
                self.repo.delete(team_id, user_id).await?;
                Err(OAuthError::TokenMissing)
            }
            Err(e) => {
                // The grant may still be valid once the token endpoint recovers.
                warn!(team_id, user_id, error = %e, "refresh failed, keeping grant");
                Err(e)
            }
        }
    }
}

/// Build the stored record for a grant. Providers may omit the refresh token
/// on refresh, in which case the previous one stays valid.
fn record_from_grant(
    team_id: &str,
    user_id: &str,
    grant: TokenGrant,
    now: DateTime<Utc>,
    previous_refresh: Option<&str>,
) -> TokenRecord {
    TokenRecord {
        team_id: team_id.to_string(),
        user_id: user_id.to_string(),
        access_token: grant.access_token,
        refresh_token: grant
            .refresh_token
            .or_else(|| previous_refresh.map(str::to_string))
            .unwrap_or_default(),
        expires_at: now + Duration::seconds(grant.expires_in),
    }
}
