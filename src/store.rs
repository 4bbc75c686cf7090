//! Persistent State Store
//!
//! Generic key -> structured-value store over SQLite (for holdout.db).
//! Values are JSON documents; the store never interprets them. A malformed
//! or unreadable payload reads as absent, which callers treat as "fall back
//! to the default" rather than an error.

use serde::{de::DeserializeOwned, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Keys the giveaway core persists under
pub mod keys {
    pub const ACTIVE_HOLDER: &str = "active_holder";
    pub const CHANNEL_LOCKED: &str = "channel_locked";
    pub const NOTIFIED_USERS: &str = "notified_users";
    pub const REFERRALS: &str = "referrals";
    pub const USER_STATS: &str = "user_stats";
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// SQLite-backed kv store. Cheap to clone; all clones share one pool.
///
/// A single connection is enough for this workload and keeps the
/// in-memory variant coherent (every :memory: connection is its own db).
#[derive(Clone)]
pub struct StateStore {
    pool: SqlitePool,
}

impl StateStore {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect(options).await
    }

    /// Ephemeral store for tests
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::query("CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .execute(&pool)
            .await?;
        Ok(Self { pool })
    }

    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let payload = serde_json::to_string(value)?;
        sqlx::query("REPLACE INTO kv (key, value) VALUES (?1, ?2)")
            .bind(key)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Load and decode a value. Read failures and malformed payloads both
    /// read as absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let row: Option<String> = sqlx::query_scalar("SELECT value FROM kv WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|err| {
                debug!(key, %err, "state read failed, treating as absent");
                None
            });
        let payload = row?;
        match serde_json::from_str(&payload) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(key, %err, "malformed persisted payload, treating as absent");
                None
            }
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM kv WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
