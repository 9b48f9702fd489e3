//! Link event log
//!
//! Append-only record of accepted target links with time-windowed
//! count, query and prune operations, backed by SQLite.

use crate::config::StorageSettings;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Query or connection failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Schema migration failure
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    /// Standard I/O error (database directory creation)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A stored timestamp is outside the representable range
    #[error("Invalid stored timestamp: {0}")]
    InvalidTimestamp(i64),
}

impl StorageError {
    /// Short machine-readable reason, safe to show to users.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Database(sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed) => {
                "storage_unavailable"
            }
            Self::Database(_) => "storage_query_failed",
            Self::Migration(_) => "storage_schema_error",
            Self::Io(_) => "storage_io_error",
            Self::InvalidTimestamp(_) => "storage_corrupt_row",
        }
    }
}

/// One accepted target link. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEvent {
    /// Poster.
    pub user_id: i64,
    /// Chat the link was posted in.
    pub chat_id: i64,
    /// The link as it appeared in the message.
    pub link_url: String,
    /// When the link was accepted (stored with millisecond precision).
    pub timestamp: DateTime<Utc>,
}

impl LinkEvent {
    /// Create a new event.
    #[must_use]
    pub fn new(
        user_id: i64,
        chat_id: i64,
        link_url: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            chat_id,
            link_url: link_url.into(),
            timestamp,
        }
    }
}

/// Interface for link event logs
///
/// Writes are durable before the call returns; reads observe every
/// committed write.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one event.
    async fn record(&self, event: &LinkEvent) -> Result<(), StorageError>;
    /// Append several events atomically: all are stored or none is.
    async fn record_all(&self, events: &[LinkEvent]) -> Result<(), StorageError>;
    /// Count events of a user in a chat with `timestamp > since`.
    async fn count_since(
        &self,
        user_id: i64,
        chat_id: i64,
        since: DateTime<Utc>,
    ) -> Result<u32, StorageError>;
    /// Events of a user in a chat with `timestamp > since`, oldest first.
    async fn events_since(
        &self,
        user_id: i64,
        chat_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<LinkEvent>, StorageError>;
    /// Delete every event with `timestamp < older_than`; returns how many were removed.
    async fn prune(&self, older_than: DateTime<Utc>) -> Result<u64, StorageError>;
    /// Check connection to storage
    async fn check_connection(&self) -> Result<(), StorageError>;
}

/// SQLite-backed event log
#[derive(Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Open (creating if needed) the database file and apply migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the database
    /// cannot be opened or a migration fails.
    pub async fn open(settings: &StorageSettings) -> Result<Self, StorageError> {
        if let Some(parent) = Path::new(&settings.path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&settings.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .connect_with(options)
            .await?;

        info!("Connected to SQLite event log at {}", settings.path);
        Self::from_pool(pool).await
    }

    /// Private in-memory database, mostly for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or migrated.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // A single connection that is never recycled keeps the database alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!("Event log migrations applied.");
        Ok(Self { pool })
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn event_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<LinkEvent, StorageError> {
    let posted_at_ms: i64 = row.try_get("posted_at_ms")?;
    let timestamp = DateTime::from_timestamp_millis(posted_at_ms)
        .ok_or(StorageError::InvalidTimestamp(posted_at_ms))?;
    Ok(LinkEvent {
        user_id: row.try_get("user_id")?,
        chat_id: row.try_get("chat_id")?,
        link_url: row.try_get("link_url")?,
        timestamp,
    })
}

const INSERT_EVENT: &str = r#"
    INSERT INTO link_history (user_id, chat_id, link_url, posted_at_ms)
    VALUES (?, ?, ?, ?)
"#;

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn record(&self, event: &LinkEvent) -> Result<(), StorageError> {
        sqlx::query(INSERT_EVENT)
            .bind(event.user_id)
            .bind(event.chat_id)
            .bind(&event.link_url)
            .bind(event.timestamp.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_all(&self, events: &[LinkEvent]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for event in events {
            sqlx::query(INSERT_EVENT)
                .bind(event.user_id)
                .bind(event.chat_id)
                .bind(&event.link_url)
                .bind(event.timestamp.timestamp_millis())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn count_since(
        &self,
        user_id: i64,
        chat_id: i64,
        since: DateTime<Utc>,
    ) -> Result<u32, StorageError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM link_history
            WHERE user_id = ? AND chat_id = ? AND posted_at_ms > ?
            "#,
        )
        .bind(user_id)
        .bind(chat_id)
        .bind(since.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn events_since(
        &self,
        user_id: i64,
        chat_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<LinkEvent>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, chat_id, link_url, posted_at_ms
            FROM link_history
            WHERE user_id = ? AND chat_id = ? AND posted_at_ms > ?
            ORDER BY posted_at_ms ASC, id ASC
            "#,
        )
        .bind(user_id)
        .bind(chat_id)
        .bind(since.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(event_from_row).collect()
    }

    async fn prune(&self, older_than: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM link_history WHERE posted_at_ms < ?")
            .bind(older_than.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn check_connection(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
