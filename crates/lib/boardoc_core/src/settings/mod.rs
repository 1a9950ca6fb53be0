//! Per-board document server settings and per-team trial state.

pub mod queries;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;

use crate::models::settings::{Demo, Settings};

#[derive(Debug, Error)]
pub enum SettingsError {
    /// Neither the board nor its team has anything stored.
    #[error("no settings stored for this board")]
    NotFound,

    #[error("settings storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for SettingsError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<crate::crypto::CryptoError> for SettingsError {
    fn from(e: crate::crypto::CryptoError) -> Self {
        Self::Storage(e.to_string())
    }
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn find(&self, team_id: &str, board_id: &str) -> Result<Settings, SettingsError>;

    /// Apply `update` to the stored settings and return the result.
    async fn save(
        &self,
        team_id: &str,
        board_id: &str,
        update: SettingsUpdate,
    ) -> Result<Settings, SettingsError>;
}

/// Partial change to a board's settings. Unset fields keep their value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub address: Option<String>,
    pub header: Option<String>,
    pub secret: Option<String>,
    /// `true` starts (or resumes) the team's trial on this board; `false`
    /// detaches the board from it.
    pub demo: Option<bool>,
}

impl SettingsUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn demo(mut self, enabled: bool) -> Self {
        self.demo = Some(enabled);
        self
    }

    /// The settings that result from applying this update at `now`.
    ///
    /// A trial start is recorded once per team; re-enabling keeps the
    /// original start time.
    pub fn apply(&self, existing: &Settings, now: DateTime<Utc>) -> Settings {
        let mut next = existing.clone();
        if let Some(address) = &self.address {
            next.address = address.trim().to_string();
        }
        if let Some(header) = &self.header {
            next.header = header.trim().to_string();
        }
        if let Some(secret) = &self.secret {
            next.secret = secret.clone();
        }
        match self.demo {
            Some(true) => {
                next.demo = Demo {
                    enabled: true,
                    started: existing.demo.started.or(Some(now)),
                };
                next.demo_detached = false;
            }
            Some(false) => next.demo_detached = true,
            None => {}
        }
        next
    }
}

impl std::fmt::Debug for SettingsUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsUpdate")
            .field("address", &self.address)
            .field("header", &self.header)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("demo", &self.demo)
            .finish()
    }
}

/// Process-local store for tests and single-instance runs.
#[derive(Default)]
pub struct MemorySettingsStore {
    boards: DashMap<(String, String), Settings>,
    demos: DashMap<String, Demo>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn find(&self, team_id: &str, board_id: &str) -> Result<Settings, SettingsError> {
        let board = self
            .boards
            .get(&(team_id.to_string(), board_id.to_string()))
            .map(|s| s.value().clone());
        let demo = self.demos.get(team_id).map(|d| d.value().clone());
        match (board, demo) {
            (None, None) => Err(SettingsError::NotFound),
            (board, demo) => Ok(Settings {
                demo: demo.unwrap_or_default(),
                ..board.unwrap_or_default()
            }),
        }
    }

    async fn save(
        &self,
        team_id: &str,
        board_id: &str,
        update: SettingsUpdate,
    ) -> Result<Settings, SettingsError> {
        let existing = match self.find(team_id, board_id).await {
            Ok(s) => s,
            Err(SettingsError::NotFound) => Settings::default(),
            Err(e) => return Err(e),
        };
        let next = update.apply(&existing, Utc::now());
        self.demos.insert(team_id.to_string(), next.demo.clone());
        self.boards
            .insert((team_id.to_string(), board_id.to_string()), next.clone());
        Ok(next)
    }
}
