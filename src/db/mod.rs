//! Subscriber store.
//!
//! The durable set of subscriber identities lives behind the
//! [`SubscriberStore`] trait so the registry never cares which backend is in
//! use:
//! - [`PgStore`]: PostgreSQL via SQLx (production default)
//! - [`SqliteStore`]: SQLite file or shared in-memory database
//! - [`MemoryStore`]: process-local set, also the test double
//!
//! Every SQL operation acquires its own pooled connection and returns it on
//! every exit path. Writes run in a transaction.

mod memory;
mod postgres;
mod sqlite;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use sqlite::SqliteStore;

use crate::config::{DatabaseConfig, StoreBackend};
use crate::state::SubscriberId;
use async_trait::async_trait;
use sqlx::migrate::Migrator;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Rows per `INSERT` statement; keeps every statement well under the bind
/// parameter limits of both SQL backends.
pub(crate) const INSERT_CHUNK: usize = 1000;

/// Embedded schema migrations, shared by every SQL backend.
pub(crate) static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection refused, acquire timeout, or the read query failed.
    #[error("store unavailable: {0}")]
    Unavailable(sqlx::Error),
    /// The write statement failed.
    #[error("store write failed: {0}")]
    WriteFailed(sqlx::Error),
    /// The write executed but the transaction did not commit.
    #[error("store commit failed: {0}")]
    CommitFailed(sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    /// The task carrying the write died before reporting back.
    #[error("store write interrupted: {0}")]
    Interrupted(String),
}

impl StoreError {
    /// Numeric code reported back to chat users.
    ///
    /// The values are the ones subscribers have always seen: 1 for
    /// connection problems, 2 for a failed statement, 3 for a failed commit.
    pub fn code(&self) -> u8 {
        match self {
            Self::Unavailable(_) => 1,
            Self::WriteFailed(_) | Self::Migration(_) | Self::Interrupted(_) => 2,
            Self::CommitFailed(_) => 3,
        }
    }

    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "store_unavailable",
            Self::WriteFailed(_) => "store_write_failed",
            Self::CommitFailed(_) => "store_commit_failed",
            Self::Migration(_) => "store_migration_failed",
            Self::Interrupted(_) => "store_write_interrupted",
        }
    }
}

/// Durable set of subscriber identities.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Backend name for logs.
    fn backend(&self) -> &'static str;

    /// Load every stored identity. An empty table is `Ok(vec![])`.
    async fn load_all(&self) -> Result<Vec<SubscriberId>, StoreError>;

    /// Insert every identity not already stored; existing rows are untouched.
    async fn save_all(&self, ids: &[SubscriberId]) -> Result<(), StoreError>;

    /// Delete one identity. Deleting an absent identity succeeds.
    async fn delete(&self, id: &SubscriberId) -> Result<(), StoreError>;
}

/// Open the configured store backend.
///
/// PostgreSQL connects lazily so an unreachable server at boot only costs the
/// initial subscriber load, not startup. Migration failures are logged and
/// the store is still returned.
pub async fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn SubscriberStore>, StoreError> {
    let store: Arc<dyn SubscriberStore> = match config.backend {
        StoreBackend::Postgres => {
            let store = PgStore::connect_lazy(config);
            if config.run_migrations
                && let Err(e) = store.migrate().await
            {
                warn!(error = %e, "Failed to apply store migrations");
            }
            Arc::new(store)
        }
        StoreBackend::Sqlite => {
            let store = SqliteStore::open(&config.path, config.acquire_timeout()).await?;
            if config.run_migrations
                && let Err(e) = store.migrate().await
            {
                warn!(error = %e, "Failed to apply store migrations");
            }
            Arc::new(store)
        }
        StoreBackend::Memory => {
            warn!("Using in-memory subscriber store - registrations will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    info!(backend = store.backend(), "Subscriber store ready");
    Ok(store)
}
