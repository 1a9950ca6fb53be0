//! PostgreSQL settings store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::debug;

use super::{SettingsError, SettingsStore, SettingsUpdate};
use crate::crypto::SecretBox;
use crate::models::settings::{Demo, Settings};

#[derive(sqlx::FromRow)]
struct BoardRow {
    address: String,
    header: String,
    secret_encrypted: String,
    demo_detached: bool,
}

#[derive(sqlx::FromRow)]
struct DemoRow {
    enabled: bool,
    started: Option<DateTime<Utc>>,
}

pub struct PgSettingsStore {
    pool: PgPool,
    secrets: SecretBox,
}

impl PgSettingsStore {
    pub fn new(pool: PgPool, secrets: SecretBox) -> Self {
        Self { pool, secrets }
    }

    async fn load(
        &self,
        conn: &mut PgConnection,
        team_id: &str,
        board_id: &str,
    ) -> Result<(Option<BoardRow>, Option<DemoRow>), SettingsError> {
        let board = sqlx::query_as::<_, BoardRow>(
            r#"
            SELECT address, header, secret_encrypted, demo_detached
            FROM settings
            WHERE team_id = $1 AND board_id = $2
            "#,
        )
        .bind(team_id)
        .bind(board_id)
        .fetch_optional(&mut *conn)
        .await?;

        let demo = sqlx::query_as::<_, DemoRow>(
            "SELECT enabled, started FROM demos WHERE team_id = $1",
        )
        .bind(team_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok((board, demo))
    }

    fn assemble(
        &self,
        board: Option<BoardRow>,
        demo: Option<DemoRow>,
    ) -> Result<Settings, SettingsError> {
        let demo = demo
            .map(|d| Demo {
                enabled: d.enabled,
                started: d.started,
            })
            .unwrap_or_default();
        Ok(match board {
            Some(b) => Settings {
                address: b.address,
                header: b.header,
                secret: self.secrets.open_optional(&b.secret_encrypted)?,
                demo_detached: b.demo_detached,
                demo,
            },
            None => Settings {
                demo,
                ..Default::default()
            },
        })
    }
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    async fn find(&self, team_id: &str, board_id: &str) -> Result<Settings, SettingsError> {
        let mut conn = self.pool.acquire().await?;
        let (board, demo) = self.load(&mut conn, team_id, board_id).await?;
        if board.is_none() && demo.is_none() {
            return Err(SettingsError::NotFound);
        }
        self.assemble(board, demo)
    }

    async fn save(
        &self,
        team_id: &str,
        board_id: &str,
        update: SettingsUpdate,
    ) -> Result<Settings, SettingsError> {
        let mut tx = self.pool.begin().await?;

        // Serialize concurrent writers for the same board.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1 || '/' || $2))")
            .bind(team_id)
            .bind(board_id)
            .execute(&mut *tx)
            .await?;

        let (board, demo) = self.load(&mut tx, team_id, board_id).await?;
        let existing = self.assemble(board, demo)?;
        let next = update.apply(&existing, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO settings (team_id, board_id, address, header, secret_encrypted, demo_detached)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (team_id, board_id)
            DO UPDATE SET address = EXCLUDED.address,
                          header = EXCLUDED.header,
                          secret_encrypted = EXCLUDED.secret_encrypted,
                          demo_detached = EXCLUDED.demo_detached,
                          updated_at = now()
            "#,
        )
        .bind(team_id)
        .bind(board_id)
        .bind(&next.address)
        .bind(&next.header)
        .bind(self.secrets.seal_optional(&next.secret)?)
        .bind(next.demo_detached)
        .execute(&mut *tx)
        .await?;

        if update.demo == Some(true) {
            // The first start wins; later enables keep it.
            sqlx::query(
                r#"
                INSERT INTO demos (team_id, enabled, started)
                VALUES ($1, TRUE, $2)
                ON CONFLICT (team_id)
                DO UPDATE SET enabled = TRUE,
                              started = COALESCE(demos.started, EXCLUDED.started)
                "#,
            )
            .bind(team_id)
            .bind(next.demo.started)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(team_id, board_id, "settings saved");
        Ok(next)
    }
}
