//! SQLite persistence for channel configs, blacklists and suggestions.
//!
//! Every operation acquires a pooled connection, runs one short statement
//! sequence and releases it. Nothing here holds a transaction across an await
//! on anything other than the database itself.

mod blacklist;
mod config;
mod suggestions;

pub use blacklist::{BlacklistEntry, BlacklistStore};
pub use config::{ChannelConfig, ConfigStore, SettingDescriptor, SettingKey, SETTINGS};
pub use suggestions::{
    NewSuggestion, SequenceReservation, Suggestion, SuggestionStatus, SuggestionStore,
};

use std::{
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::Result;

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

const SCHEMA: &[&str] = &[
    // `BIGINT` keeps channel_id out of the rowid alias so rowid tracks insertion order.
    r#"CREATE TABLE IF NOT EXISTS config (
        channel_id                  BIGINT  PRIMARY KEY,
        guild_id                    BIGINT  NOT NULL,
        role_id                     BIGINT  DEFAULT NULL,
        allow_anonymous             INTEGER NOT NULL DEFAULT 0,
        action_notification_enabled INTEGER NOT NULL DEFAULT 0,
        allow_attachments           INTEGER NOT NULL DEFAULT 0,
        allow_edits                 INTEGER NOT NULL DEFAULT 0,
        enabled                     INTEGER NOT NULL DEFAULT 1
    )"#,
    r#"CREATE TABLE IF NOT EXISTS blacklist (
        guild_id   BIGINT NOT NULL,
        channel_id BIGINT NOT NULL,
        user_id    BIGINT NOT NULL,
        reason     TEXT   DEFAULT NULL,
        UNIQUE (channel_id, user_id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS store (
        id                BIGINT  NOT NULL,
        guild_id          BIGINT  NOT NULL,
        channel_id        BIGINT  NOT NULL,
        author_id         BIGINT  NOT NULL,
        message_id        INTEGER NOT NULL,
        content           TEXT,
        attachment_url    TEXT,
        anonymous         INTEGER NOT NULL DEFAULT 0,
        status            TEXT    NOT NULL DEFAULT 'pending',
        edited_at         TEXT    NOT NULL,
        action_updated_at TEXT,
        action_note       TEXT,
        UNIQUE (guild_id, id)
    )"#,
];

/// Database handle with connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    stores: Stores,
}

impl Database {
    /// Connection acquire timeout - prevents connection storms from blocking indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Open (or create) the database at `path` and make sure the schema exists.
    ///
    /// `:memory:` opens a private in-memory database, used by tests.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = if path.as_os_str() == ":memory:" {
            // A uniquely named shared-cache memory database per call;
            // plain `:memory:` would hand every pooled connection its own database.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:oxide-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        warn!(path = %parent.display(), error = %e, "failed to create database directory");
                    }
                }
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&pool).await?;
        }

        info!(path = %path.display(), "database ready");
        let stores = Stores {
            configs: ConfigStore::new(pool.clone()),
            blacklist: BlacklistStore::new(pool.clone()),
            suggestions: SuggestionStore::new(pool.clone()),
        };
        Ok(Self { pool, stores })
    }

    pub async fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:")).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The three stores over this pool. Clones share the per-guild sequence locks.
    pub fn stores(&self) -> Stores {
        self.stores.clone()
    }
}

/// The persistence layer as seen by the lifecycle controller.
#[derive(Clone)]
pub struct Stores {
    pub configs: ConfigStore,
    pub blacklist: BlacklistStore,
    pub suggestions: SuggestionStore,
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|e| e.is_unique_violation())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_databases_are_isolated() {
        let a = Database::open_in_memory().await.unwrap().stores();
        let b = Database::open_in_memory().await.unwrap().stores();

        a.configs
            .create(crate::domain::GuildId(1), crate::domain::ChannelId(10))
            .await
            .unwrap();

        assert!(a
            .configs
            .get(crate::domain::ChannelId(10))
            .await
            .unwrap()
            .is_some());
        assert!(b
            .configs
            .get(crate::domain::ChannelId(10))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn schema_creation_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(db.pool()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn file_database_creates_parent_directory() {
        let root = std::env::temp_dir().join(format!("oxide-db-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        let path = root.join("nested").join("suggestions.db");

        let db = Database::open(&path).await.unwrap();
        db.stores()
            .configs
            .create(crate::domain::GuildId(1), crate::domain::ChannelId(2))
            .await
            .unwrap();
        assert!(path.exists());

        db.pool().close().await;
        let _ = std::fs::remove_dir_all(&root);
    }
}
