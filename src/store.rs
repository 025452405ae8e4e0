//! Durable label counters backed by SQLite.
//!
//! The whole lookup-or-create-then-increment step is a single upsert
//! statement, so concurrent writers can never lose an update or observe the
//! same label as new twice.

use crate::core::LabelStore;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored count for '{label}' is negative: {count}")]
    CorruptCount { label: String, count: i64 },
}

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS subdomains (
        label TEXT PRIMARY KEY NOT NULL,
        occurrences INTEGER NOT NULL
    )
"#;

const UPSERT: &str = r#"
    INSERT INTO subdomains (label, occurrences) VALUES (?, 1)
    ON CONFLICT(label) DO UPDATE SET occurrences = occurrences + 1
    RETURNING occurrences
"#;

pub struct SqliteLabelStore {
    pool: SqlitePool,
}

impl SqliteLabelStore {
    /// Opens (creating if needed) the database at `path` and ensures the
    /// schema exists.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        // SQLite is single-writer.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        info!(path = %path.display(), "Opened label counter database");

        Ok(Self { pool })
    }

    /// Returns the stored count for a label without modifying it.
    #[cfg(test)]
    pub async fn count(&self, label: &str) -> Result<Option<u64>, StoreError> {
        let count: Option<i64> =
            sqlx::query_scalar("SELECT occurrences FROM subdomains WHERE label = ?")
                .bind(label)
                .fetch_optional(&self.pool)
                .await?;
        count.map(|c| to_count(label, c)).transpose()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn to_count(label: &str, count: i64) -> Result<u64, StoreError> {
    u64::try_from(count).map_err(|_| StoreError::CorruptCount {
        label: label.to_string(),
        count,
    })
}

#[async_trait]
impl LabelStore for SqliteLabelStore {
    async fn record(&self, label: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(UPSERT)
            .bind(label)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(to_count(label, count)?)
    }
}
