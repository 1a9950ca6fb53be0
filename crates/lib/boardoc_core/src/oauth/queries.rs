//! Persistence of OAuth grants.
//!
//! Both tokens are sealed with [`SecretBox`] before they reach PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::PgPool;

use super::OAuthError;
use crate::crypto::SecretBox;
use crate::models::auth::TokenRecord;

#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn find(&self, team_id: &str, user_id: &str) -> Result<Option<TokenRecord>, OAuthError>;

    /// Insert or replace the record in one statement.
    async fn save(&self, record: &TokenRecord) -> Result<(), OAuthError>;

    async fn delete(&self, team_id: &str, user_id: &str) -> Result<(), OAuthError>;
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    team_id: String,
    user_id: String,
    access_token_encrypted: String,
    refresh_token_encrypted: String,
    expires_at: DateTime<Utc>,
}

pub struct PgTokenRepository {
    pool: PgPool,
    secrets: SecretBox,
}

impl PgTokenRepository {
    pub fn new(pool: PgPool, secrets: SecretBox) -> Self {
        Self { pool, secrets }
    }
}

#[async_trait]
impl TokenRepository for PgTokenRepository {
    async fn find(&self, team_id: &str, user_id: &str) -> Result<Option<TokenRecord>, OAuthError> {
        let row = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT team_id, user_id, access_token_encrypted, refresh_token_encrypted, expires_at
            FROM oauth_tokens
            WHERE team_id = $1 AND user_id = $2
            "#,
        )
        .bind(team_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(TokenRecord {
                access_token: self.secrets.open(&r.access_token_encrypted)?,
                refresh_token: self.secrets.open_optional(&r.refresh_token_encrypted)?,
                team_id: r.team_id,
                user_id: r.user_id,
                expires_at: r.expires_at,
            })
        })
        .transpose()
    }

    async fn save(&self, record: &TokenRecord) -> Result<(), OAuthError> {
        let access = self.secrets.seal(&record.access_token)?;
        let refresh = self.secrets.seal_optional(&record.refresh_token)?;
        sqlx::query(
            r#"
            INSERT INTO oauth_tokens
                (team_id, user_id, access_token_encrypted, refresh_token_encrypted, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (team_id, user_id)
            DO UPDATE SET access_token_encrypted = EXCLUDED.access_token_encrypted,
                          refresh_token_encrypted = EXCLUDED.refresh_token_encrypted,
                          expires_at = EXCLUDED.expires_at,
                          updated_at = now()
            "#,
        )
        .bind(&record.team_id)
        .bind(&record.user_id)
        .bind(access)
        .bind(refresh)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, team_id: &str, user_id: &str) -> Result<(), OAuthError> {
        sqlx::query("DELETE FROM oauth_tokens WHERE team_id = $1 AND user_id = $2")
            .bind(team_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Process-local repository for tests and single-instance runs.
#[derive(Default)]
pub struct MemoryTokenRepository {
    records: DashMap<(String, String), TokenRecord>,
}

impl MemoryTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenRepository for MemoryTokenRepository {
    async fn find(&self, team_id: &str, user_id: &str) -> Result<Option<TokenRecord>, OAuthError> {
        Ok(self
            .records
            .get(&(team_id.to_string(), user_id.to_string()))
            .map(|r| r.value().clone()))
    }

    async fn save(&self, record: &TokenRecord) -> Result<(), OAuthError> {
        self.records.insert(
            (record.team_id.clone(), record.user_id.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn delete(&self, team_id: &str, user_id: &str) -> Result<(), OAuthError> {
        self.records
            .remove(&(team_id.to_string(), user_id.to_string()));
        Ok(())
    }
}
