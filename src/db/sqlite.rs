//! SQLite subscriber store.

use super::{INSERT_CHUNK, MIGRATOR, StoreError, SubscriberStore};
use crate::state::SubscriberId;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Connection, QueryBuilder, Sqlite};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Subscriber store backed by a SQLite `chats` table.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Open (creating if missing) the database at `path`.
    ///
    /// `":memory:"` opens a private shared-cache memory database that lives as
    /// long as this store.
    pub async fn open(path: &str, acquire_timeout: Duration) -> Result<Self, StoreError> {
        let pool = if path == ":memory:" {
            // `file::memory:` is global-ish and will collide across parallel tests.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:relayd-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            // The database disappears with its last connection, so keep one alive.
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .acquire_timeout(acquire_timeout)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
                .map_err(StoreError::Unavailable)?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(acquire_timeout)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await
                .map_err(StoreError::Unavailable)?
        };

        // WAL lets broadcast-time reads proceed while a registration commits.
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await
            .map_err(StoreError::Unavailable)?;

        info!(path = %path, "SQLite store connected");
        Ok(Self { pool })
    }

    /// Apply embedded migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        info!("Store migrations checked/applied");
        Ok(())
    }
}

#[async_trait]
impl SubscriberStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn load_all(&self) -> Result<Vec<SubscriberId>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::Unavailable)?;

        let rows: Vec<String> = sqlx::query_scalar("SELECT chat_id FROM chats ORDER BY chat_id")
            .fetch_all(&mut *conn)
            .await
            .map_err(StoreError::Unavailable)?;

        debug!(count = rows.len(), "Loaded subscribers");
        Ok(rows.into_iter().map(SubscriberId::from).collect())
    }

    async fn save_all(&self, ids: &[SubscriberId]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut conn = self.pool.acquire().await.map_err(StoreError::Unavailable)?;
        let mut tx = conn.begin().await.map_err(StoreError::Unavailable)?;

        for chunk in ids.chunks(INSERT_CHUNK) {
            let mut insert: QueryBuilder<'_, Sqlite> =
                QueryBuilder::new("INSERT INTO chats (chat_id) ");
            insert.push_values(chunk, |mut row, id| {
                row.push_bind(id.as_str());
            });
            insert.push(" ON CONFLICT DO NOTHING");

            insert
                .build()
                .execute(&mut *tx)
                .await
                .map_err(StoreError::WriteFailed)?;
        }

        tx.commit().await.map_err(StoreError::CommitFailed)?;
        Ok(())
    }

    async fn delete(&self, id: &SubscriberId) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::Unavailable)?;
        let mut tx = conn.begin().await.map_err(StoreError::Unavailable)?;

        sqlx::query("DELETE FROM chats WHERE chat_id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(StoreError::WriteFailed)?;

        tx.commit().await.map_err(StoreError::CommitFailed)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> SqliteStore {
        let store = SqliteStore::open(":memory:", Duration::from_secs(5))
            .await
            .unwrap();
        store.migrate().await.unwrap();
        store
    }

    fn ids(raw: &[&str]) -> Vec<SubscriberId> {
        raw.iter().map(|s| SubscriberId::from(*s)).collect()
    }

    #[tokio::test]
    async fn empty_table_loads_empty() {
        let store = memory_store().await;
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_all_tolerates_duplicates() {
        let store = memory_store().await;
        store.save_all(&ids(&["42", "7"])).await.unwrap();
        // Full-set rewrite: existing rows stay, new ones are added.
        store.save_all(&ids(&["42", "7", "100"])).await.unwrap();

        assert_eq!(store.load_all().await.unwrap(), ids(&["100", "42", "7"]));
    }

    #[tokio::test]
    async fn large_sets_are_split_into_statements() {
        let store = memory_store().await;
        // More identities than SQLite accepts bind parameters in one statement.
        let many: Vec<SubscriberId> = (0..40_000i64).map(SubscriberId::from).collect();

        store.save_all(&many).await.unwrap();
        assert_eq!(store.load_all().await.unwrap().len(), 40_000);
    }

    #[tokio::test]
    async fn delete_removes_exactly_one() {
        let store = memory_store().await;
        store.save_all(&ids(&["1", "2", "3"])).await.unwrap();

        store.delete(&SubscriberId::from("2")).await.unwrap();
        assert_eq!(store.load_all().await.unwrap(), ids(&["1", "3"]));

        // Absent identity is a no-op.
        store.delete(&SubscriberId::from("2")).await.unwrap();
        assert_eq!(store.load_all().await.unwrap(), ids(&["1", "3"]));
    }

    #[tokio::test]
    async fn identities_are_bound_not_spliced() {
        let store = memory_store().await;
        let hostile = SubscriberId::from("1'); DROP TABLE chats; --");
        store.save_all(std::slice::from_ref(&hostile)).await.unwrap();

        assert_eq!(store.load_all().await.unwrap(), vec![hostile.clone()]);
        store.delete(&hostile).await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("relayd.db");
        let path = path.to_str().unwrap().to_string();

        {
            let store = SqliteStore::open(&path, Duration::from_secs(5)).await.unwrap();
            store.migrate().await.unwrap();
            store.save_all(&ids(&["42"])).await.unwrap();
        }

        let reopened = SqliteStore::open(&path, Duration::from_secs(5)).await.unwrap();
        reopened.migrate().await.unwrap();
        assert_eq!(reopened.load_all().await.unwrap(), ids(&["42"]));
    }
}
