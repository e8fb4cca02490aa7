//! Lock store backends.
//!
//! [`SqliteLockStore`] is the shared store for multi-process deployments:
//! every operation is one SQL statement, so there is no window between
//! checking the holder and writing it. [`MemoryLockStore`] has the same
//! semantics inside one process.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::{collections::HashMap, sync::Arc, time::Duration};

use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use crate::{
    clock::Clock,
    lock::{LockHolder, LockStore, LockToken},
    Result,
};

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// Plan locks in a `plan_locks` table.
#[derive(Debug, Clone)]
pub struct SqliteLockStore {
    db: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteLockStore {
    #[must_use]
    pub fn new(db: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Initialize the locks table.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS plan_locks (
                resource TEXT PRIMARY KEY,
                token TEXT NOT NULL,
                acquired_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )",
        )
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl LockStore for SqliteLockStore {
    async fn try_acquire(&self, resource: &str, token: &LockToken, ttl: Duration) -> Result<bool> {
        let now = self.clock.now_millis();
        let expires_at = now.saturating_add(ttl_millis(ttl));

        // Re-acquiring with our own token keeps the original acquired_at.
        let result = sqlx::query(
            "INSERT INTO plan_locks (resource, token, acquired_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(resource) DO UPDATE SET
                 acquired_at = CASE WHEN plan_locks.token = excluded.token
                                    THEN plan_locks.acquired_at ELSE excluded.acquired_at END,
                 token = excluded.token,
                 expires_at = excluded.expires_at
             WHERE plan_locks.token = excluded.token OR plan_locks.expires_at < ?3",
        )
        .bind(resource)
        .bind(token.as_str())
        .bind(now)
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn extend(&self, resource: &str, token: &LockToken, ttl: Duration) -> Result<bool> {
        let now = self.clock.now_millis();
        let result = sqlx::query(
            "UPDATE plan_locks SET expires_at = ?1
             WHERE resource = ?2 AND token = ?3 AND expires_at >= ?4",
        )
        .bind(now.saturating_add(ttl_millis(ttl)))
        .bind(resource)
        .bind(token.as_str())
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, resource: &str, token: &LockToken) -> Result<bool> {
        let result = sqlx::query("DELETE FROM plan_locks WHERE resource = ? AND token = ?")
            .bind(resource)
            .bind(token.as_str())
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn holder(&self, resource: &str) -> Result<Option<LockHolder>> {
        let row = sqlx::query(
            "SELECT token, acquired_at, expires_at FROM plan_locks
             WHERE resource = ? AND expires_at >= ?",
        )
        .bind(resource)
        .bind(self.clock.now_millis())
        .fetch_optional(&self.db)
        .await?;

        row.map(|row| {
            Ok::<_, crate::Error>(LockHolder {
                resource: resource.to_string(),
                token: LockToken::new(row.try_get::<String, _>("token")?),
                acquired_at: row.try_get("acquired_at")?,
                expires_at: row.try_get("expires_at")?,
            })
        })
        .transpose()
    }
}

#[derive(Debug, Clone)]
struct Entry {
    token: LockToken,
    acquired_at: i64,
    expires_at: i64,
}

/// In-process lock store.
#[derive(Debug, Clone)]
pub struct MemoryLockStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryLockStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }
}

#[async_trait::async_trait]
impl LockStore for MemoryLockStore {
    async fn try_acquire(&self, resource: &str, token: &LockToken, ttl: Duration) -> Result<bool> {
        let now = self.clock.now_millis();
        let expires_at = now.saturating_add(ttl_millis(ttl));
        let mut entries = self.entries.lock().await;

        let acquired_at = match entries.get(resource) {
            Some(held) if held.token == *token => held.acquired_at,
            Some(held) if held.expires_at >= now => return Ok(false),
            _ => now,
        };
        entries.insert(
            resource.to_string(),
            Entry {
                token: token.clone(),
                acquired_at,
                expires_at,
            },
        );
        Ok(true)
    }

    async fn extend(&self, resource: &str, token: &LockToken, ttl: Duration) -> Result<bool> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;
        match entries.get_mut(resource) {
            Some(held) if held.token == *token && held.expires_at >= now => {
                held.expires_at = now.saturating_add(ttl_millis(ttl));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, resource: &str, token: &LockToken) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        if entries.get(resource).is_some_and(|held| held.token == *token) {
            entries.remove(resource);
            return Ok(true);
        }
        Ok(false)
    }

    async fn holder(&self, resource: &str) -> Result<Option<LockHolder>> {
        let now = self.clock.now_millis();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(resource)
            .filter(|held| held.expires_at >= now)
            .map(|held| LockHolder {
                resource: resource.to_string(),
                token: held.token.clone(),
                acquired_at: held.acquired_at,
                expires_at: held.expires_at,
            }))
    }
}
