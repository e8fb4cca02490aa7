//! Database layer for plansync
//!
//! One SQLite pool backs the lock table, the job queue and, for the
//! `sqlite` store kind, the documents table.

use std::{str::FromStr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use plansync_core::{
    Config, DocumentStore, HttpDocumentStore, Retention, SqliteDocumentStore, SqliteJobQueue,
    SqliteLockStore, StoreKind, SystemClock,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct PlansyncDb {
    pool: SqlitePool,
}

impl PlansyncDb {
    /// Open (creating if needed) the database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid database url '{url}'"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open database '{url}'"))?;
        tracing::debug!(url, "database connected");
        Ok(Self { pool })
    }

    pub async fn lock_store(&self) -> Result<SqliteLockStore> {
        let store = SqliteLockStore::new(self.pool.clone(), Arc::new(SystemClock));
        store.init().await?;
        Ok(store)
    }

    pub async fn job_queue(&self, config: &Config) -> Result<SqliteJobQueue> {
        let queue = SqliteJobQueue::new(
            self.pool.clone(),
            Arc::new(SystemClock),
            Retention::from(&config.queue),
        );
        queue.init().await?;
        Ok(queue)
    }

    pub async fn sqlite_documents(&self) -> Result<SqliteDocumentStore> {
        let store = SqliteDocumentStore::new(self.pool.clone());
        store.init().await?;
        Ok(store)
    }

    /// Document store selected by `[store] kind`.
    pub async fn document_store(&self, config: &Config) -> Result<Arc<dyn DocumentStore>> {
        match config.store.kind {
            StoreKind::Sqlite => Ok(Arc::new(self.sqlite_documents().await?)),
            StoreKind::Http => Ok(Arc::new(HttpDocumentStore::from_config(&config.store)?)),
        }
    }
}
