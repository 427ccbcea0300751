//! PostgreSQL subscriber store.

use super::{INSERT_CHUNK, MIGRATOR, StoreError, SubscriberStore};
use crate::config::DatabaseConfig;
use crate::state::SubscriberId;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Connection, Postgres, QueryBuilder};
use std::time::Duration;
use tracing::{debug, info};

/// Subscriber store backed by a PostgreSQL `chats` table.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Build the pool without connecting; the first operation connects.
    pub fn connect_lazy(config: &DatabaseConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.name)
            .username(&config.user)
            .password(config.password.expose_secret());

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(config.acquire_timeout())
            .idle_timeout(Some(Self::IDLE_TIMEOUT))
            .test_before_acquire(true)
            .connect_lazy_with(options);

        info!(
            host = %config.host,
            port = config.port,
            database = %config.name,
            "PostgreSQL store configured"
        );

        Self { pool }
    }

    /// Apply embedded migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        info!("Store migrations checked/applied");
        Ok(())
    }
}

#[async_trait]
impl SubscriberStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
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
            let mut insert: QueryBuilder<'_, Postgres> =
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

        sqlx::query("DELETE FROM chats WHERE chat_id = $1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(StoreError::WriteFailed)?;

        tx.commit().await.map_err(StoreError::CommitFailed)?;
        Ok(())
    }
}
