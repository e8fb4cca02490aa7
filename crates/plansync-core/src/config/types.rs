//! Configuration type definitions
//!
//! Every table is `#[serde(default)]`, so a config file only needs the keys it
//! changes.

use std::{str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{lock::RetryPolicy, Error};

// ═══════════════════════════════════════════════════════════════════════════
// MAIN CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════

/// Root configuration structure
///
/// Loaded from defaults → global → project → env vars → CLI flags
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// sqlx connection URL for the queue and lock tables.
    pub database_url: String,
    pub worker: WorkerConfig,
    pub lock: LockConfig,
    pub queue: QueueConfig,
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://plansync.db?mode=rwc".to_string(),
            worker: WorkerConfig::default(),
            lock: LockConfig::default(),
            queue: QueueConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// NESTED CONFIGURATION STRUCTURES
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    /// Active jobs older than this are handed back to the queue. Unset means
    /// twice the lock TTL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stall_after_ms: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval_ms: 500,
            stall_after_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LockConfig {
    pub ttl_ms: u64,
    pub retry_delay_ms: u64,
    pub factor: u32,
    pub max_delay_ms: u64,
    pub max_retries: u32,
    pub jitter: bool,
    /// Critical sections running longer than this extend the lock once
    /// before writing.
    pub extend_after_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 30_000,
            retry_delay_ms: 200,
            factor: 2,
            max_delay_ms: 2_000,
            max_retries: 10,
            jitter: true,
            extend_after_ms: 10_000,
        }
    }
}

impl LockConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    #[must_use]
    pub const fn extend_after(&self) -> Duration {
        Duration::from_millis(self.extend_after_ms)
    }

    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry_delay_ms),
            factor: self.factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_retries: self.max_retries,
            jitter: self.jitter,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueueConfig {
    /// Enqueue delay during which a newer submission supersedes a waiting job.
    pub debounce_ms: u64,
    pub attempts: u32,
    /// First retry delay; doubles with every attempt.
    pub backoff_ms: u64,
    pub keep_completed: u32,
    pub keep_failed: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1_000,
            attempts: 3,
            backoff_ms: 1_000,
            keep_completed: 100,
            keep_failed: 50,
        }
    }
}

/// Which document store backend the worker talks to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// `documents` table in the configured database.
    #[default]
    Sqlite,
    /// Remote REST store at `store.base_url`.
    Http,
}

impl FromStr for StoreKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "http" => Ok(Self::Http),
            other => Err(Error::InvalidConfig(format!(
                "unknown store kind '{other}' (expected 'sqlite' or 'http')"
            ))),
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Http => write!(f, "http"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Sqlite,
            base_url: None,
            token: None,
            timeout_ms: 10_000,
        }
    }
}

impl WorkerConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Stall threshold, falling back to twice `lock_ttl`.
    #[must_use]
    pub fn stall_after(&self, lock_ttl: Duration) -> Duration {
        self.stall_after_ms
            .map_or_else(|| lock_ttl.saturating_mul(2), Duration::from_millis)
    }
}
