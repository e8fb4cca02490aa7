//! Plan lock manager.
//!
//! A [`Lock`] is an immutable value: resource key, a token unique to this
//! acquisition, a TTL and a retry policy. The free functions [`acquire`],
//! [`extend`] and [`release`] run it against a shared [`LockStore`].
//!
//! # Store contract
//!
//! Each store operation is a single atomic step:
//!
//! - `try_acquire`: set `(token, now + ttl)` if the key is absent, expired, or
//!   already holds `token`
//! - `extend`: refresh the expiry only while the key still holds `token`
//! - `release`: delete only while the key still holds `token`
//!
//! A lock acquired at `t` with TTL `ttl` is held through `t + ttl` inclusive
//! and free from `t + ttl + 1` on.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{config::LockConfig, Error, Result};

/// Prefix of every plan lock key.
pub const PLAN_RESOURCE_PREFIX: &str = "plan:";

/// Lock key guarding a plan document.
#[must_use]
pub fn plan_resource_key(plan_id: &str) -> String {
    format!("{PLAN_RESOURCE_PREFIX}{plan_id}")
}

/// Opaque value identifying one acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockToken(String);

impl LockToken {
    /// A fresh random token (128 bits, hex).
    #[must_use]
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self(hex::encode(bytes))
    }

    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current holder of a resource, as seen by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolder {
    pub resource: String,
    pub token: LockToken,
    pub acquired_at: i64,
    pub expires_at: i64,
}

/// Backoff schedule for contended acquisitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub factor: u32,
    pub max_delay: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Add up to half the computed delay at random.
    pub jitter: bool,
}

impl RetryPolicy {
    /// Only ever try once.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            base_delay: Duration::ZERO,
            factor: 1,
            max_delay: Duration::ZERO,
            max_retries: 0,
            jitter: false,
        }
    }

    /// Delay before retry number `attempt` (0-based), without jitter.
    #[must_use]
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.max(1).saturating_pow(attempt);
        self.base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }

    /// Delay before retry number `attempt`, jitter applied.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_for(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let spread = u64::try_from(delay.as_millis() / 2).unwrap_or(u64::MAX);
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}

/// One acquisition of one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    resource_key: String,
    token: LockToken,
    ttl: Duration,
    retry: RetryPolicy,
}

impl Lock {
    #[must_use]
    pub fn new(resource_key: impl Into<String>, ttl: Duration, retry: RetryPolicy) -> Self {
        Self {
            resource_key: resource_key.into(),
            token: LockToken::generate(),
            ttl,
            retry,
        }
    }

    /// Lock for `plan_id` configured from `config`, with a fresh token.
    #[must_use]
    pub fn for_plan(plan_id: &str, config: &LockConfig) -> Self {
        Self::new(plan_resource_key(plan_id), config.ttl(), config.retry_policy())
    }

    /// Same resource and settings, different token.
    #[must_use]
    pub fn with_token(mut self, token: LockToken) -> Self {
        self.token = token;
        self
    }

    #[must_use]
    pub fn resource_key(&self) -> &str {
        &self.resource_key
    }

    #[must_use]
    pub const fn token(&self) -> &LockToken {
        &self.token
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }
}

/// Shared key-value store holding lock tokens.
#[async_trait::async_trait]
pub trait LockStore: Send + Sync {
    /// Atomically take `resource` for `token` if absent, expired or already ours.
    async fn try_acquire(&self, resource: &str, token: &LockToken, ttl: Duration) -> Result<bool>;

    /// Atomically push the expiry out while `token` still holds `resource`.
    async fn extend(&self, resource: &str, token: &LockToken, ttl: Duration) -> Result<bool>;

    /// Atomically delete `resource` while `token` still holds it.
    async fn release(&self, resource: &str, token: &LockToken) -> Result<bool>;

    /// Current unexpired holder of `resource`.
    async fn holder(&self, resource: &str) -> Result<Option<LockHolder>>;
}

/// Take `lock`, retrying with backoff while another token holds it.
///
/// # Errors
///
/// [`Error::LockNotAcquired`] once the retry budget is spent; store errors
/// are returned as-is.
pub async fn acquire(store: &dyn LockStore, lock: &Lock) -> Result<()> {
    let policy = lock.retry();
    let mut attempt = 0;
    loop {
        if store
            .try_acquire(lock.resource_key(), lock.token(), lock.ttl())
            .await?
        {
            tracing::debug!(resource = %lock.resource_key(), attempt, "lock acquired");
            return Ok(());
        }
        if attempt >= policy.max_retries {
            tracing::warn!(
                resource = %lock.resource_key(),
                attempts = attempt + 1,
                "lock acquisition exhausted retries"
            );
            return Err(Error::LockNotAcquired {
                resource: lock.resource_key().to_string(),
                attempts: attempt + 1,
            });
        }
        let delay = policy.delay_for(attempt);
        tracing::trace!(resource = %lock.resource_key(), attempt, ?delay, "lock contended, backing off");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Heartbeat: refresh the expiry of a held lock. `ttl` defaults to the
/// lock's own TTL. Returns `false` when the lock is no longer ours.
pub async fn extend(store: &dyn LockStore, lock: &Lock, ttl: Option<Duration>) -> Result<bool> {
    let extended = store
        .extend(lock.resource_key(), lock.token(), ttl.unwrap_or(lock.ttl()))
        .await?;
    if !extended {
        tracing::warn!(resource = %lock.resource_key(), "lock extend refused, ownership lost");
    }
    Ok(extended)
}

/// Compare-and-delete. Returns `false` (and changes nothing) when another
/// token holds the resource or nothing is stored.
pub async fn release(store: &dyn LockStore, lock: &Lock) -> Result<bool> {
    let released = store.release(lock.resource_key(), lock.token()).await?;
    if released {
        tracing::debug!(resource = %lock.resource_key(), "lock released");
    } else {
        tracing::debug!(resource = %lock.resource_key(), "lock release was a no-op");
    }
    Ok(released)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn policy(jitter: bool) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(50),
            factor: 2,
            max_delay: Duration::from_millis(300),
            max_retries: 5,
            jitter,
        }
    }

    #[test]
    fn backoff_grows_then_caps() {
        let p = policy(false);
        let delays: Vec<u128> = (0..6).map(|a| p.base_delay_for(a).as_millis()).collect();
        assert_eq!(delays, vec![50, 100, 200, 300, 300, 300]);
    }

    #[test]
    fn jitter_stays_within_half_the_delay() {
        let p = policy(true);
        for attempt in 0..6 {
            let base = p.base_delay_for(attempt);
            let jittered = p.delay_for(attempt);
            assert!(jittered >= base);
            assert!(jittered <= base + base / 2);
        }
    }

    #[test]
    fn tokens_are_unique_per_acquisition() {
        let a = Lock::new("plan:p1", Duration::from_secs(1), RetryPolicy::no_retry());
        let b = Lock::new("plan:p1", Duration::from_secs(1), RetryPolicy::no_retry());
        assert_ne!(a.token(), b.token());
        assert_eq!(a.token().as_str().len(), 32);
    }

    #[test]
    fn plan_lock_key() {
        assert_eq!(plan_resource_key("p1"), "plan:p1");
        let lock = Lock::for_plan("p1", &LockConfig::default());
        assert_eq!(lock.resource_key(), "plan:p1");
        assert_eq!(lock.ttl(), Duration::from_millis(30_000));
    }
}
