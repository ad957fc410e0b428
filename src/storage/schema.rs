use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{Collection, StorageError, Store};

// ============================================================================
// SqliteStore
// ============================================================================

/// Durable store backed by SQLite.
///
/// Each collection is one row in the `collections` table holding the JSON
/// snapshot. A write is a single upsert inside a transaction, which gives
/// the all-or-nothing replace the [`Store`] contract asks for.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database on a single connection.
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let in_memory = path == ":memory:";
        let url = format!("sqlite:{}?mode=rwc", path);

        #[cfg(unix)]
        if !in_memory {
            // Pre-create with owner-only permissions so there is no window
            // where the file exists with the default umask.
            use std::os::unix::fs::OpenOptionsExt;
            let db_path = std::path::Path::new(path);
            if !db_path.exists() {
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok(); // SQLite reports the real error at connect time
            }
        }

        // busy_timeout lets a second writer wait out a short lock instead of
        // failing with SQLITE_BUSY straight away.
        let options = SqliteConnectOptions::from_str(&url)?.pragma("busy_timeout", "5000");

        // Every connection to :memory: is its own database, so keep one.
        let max_connections = if in_memory { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store
            .migrate()
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;
        tracing::debug!(path = %path, "Opened SQLite store");
        Ok(store)
    }

    /// Create the schema. Idempotent; safe to run on every open.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY NOT NULL,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Close the pool. Later reads and writes fail with a storage error.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn read(&self, collection: Collection) -> Result<Option<String>, StorageError> {
        if self.pool.is_closed() {
            return Err(StorageError::Unavailable("database pool closed".into()));
        }

        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM collections WHERE name = ?")
            .bind(collection.name())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(data,)| data))
    }

    async fn write(&self, collection: Collection, snapshot: String) -> Result<(), StorageError> {
        if self.pool.is_closed() {
            return Err(StorageError::Unavailable("database pool closed".into()));
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO collections (name, data, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(name) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        )
        .bind(collection.name())
        .bind(&snapshot)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::trace!(collection = %collection, bytes = snapshot.len(), "Collection snapshot written");
        Ok(())
    }
}
