//! Job queue domain types and the persistence port.
//!
//! # State Machine
//!
//! ```text
//! waiting -> active -> completed
//!              |
//!              +-> waiting   (retryable failure with attempts left, or stall reclaim)
//!              '-> failed    (non-retryable, or attempts exhausted)
//! ```
//!
//! Terminal states: `completed`, `failed`

use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{config::QueueConfig, model::PlanUpdate, Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JOB STATUS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Due at `run_at`; may still be superseded.
    Waiting,
    /// Claimed by a worker.
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::Parse(format!("unknown job status '{other}'"))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JOBS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A job about to be enqueued.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub dedup_key: String,
    pub update: PlanUpdate,
    /// Higher runs first.
    pub priority: i64,
}

/// Scheduling and retry settings for one enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOptions {
    pub delay: Duration,
    pub max_attempts: u32,
    /// First retry delay; doubled per attempt already made.
    pub backoff: Duration,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for EnqueueOptions {
    fn from(config: &QueueConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.debounce_ms),
            max_attempts: config.attempts,
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }
}

/// Result of a successful enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    pub id: i64,
    pub run_at: i64,
    /// Waiting jobs with the same dedup key that this one replaced.
    pub superseded: u64,
}

/// A stored job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedJob {
    pub id: i64,
    pub dedup_key: String,
    pub update: PlanUpdate,
    pub priority: i64,
    pub status: JobStatus,
    /// Attempts started so far.
    pub attempts: u32,
    pub max_attempts: u32,
    pub backoff_ms: i64,
    pub run_at: i64,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub last_error: Option<String>,
    pub worker_id: Option<String>,
}

/// What `fail` did with a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Back to waiting, due at `run_at`.
    Retrying { run_at: i64, attempts: u32 },
    /// Moved to the failed record.
    Failed { attempts: u32 },
    /// Dropped because a newer job with the same dedup key is queued.
    Superseded,
}

/// Bounded history of finished jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub keep_completed: u32,
    pub keep_failed: u32,
}

impl Default for Retention {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for Retention {
    fn from(config: &QueueConfig) -> Self {
        Self {
            keep_completed: config.keep_completed,
            keep_failed: config.keep_failed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub waiting: u64,
    /// Waiting jobs whose `run_at` is still in the future.
    pub delayed: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Retry delay after `attempts` attempts: `backoff * 2^(attempts-1)`.
#[must_use]
pub fn retry_delay_ms(backoff_ms: i64, attempts: u32) -> i64 {
    let exponent = attempts.saturating_sub(1).min(32);
    backoff_ms.saturating_mul(1_i64 << exponent)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PERSISTENCE PORT
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Durable job list shared by the gateway and the worker pool.
#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    /// Replace every waiting job with the same dedup key by `job`.
    ///
    /// `Ok(None)` means a concurrent submission for the same key won the
    /// insert; the request is absorbed, not failed.
    async fn enqueue_deduplicated(&self, job: NewJob, options: EnqueueOptions) -> Result<Option<Enqueued>>;

    /// Claim the best due waiting job for `worker_id`. A job is never
    /// claimed while another job with its dedup key is active.
    async fn claim_next(&self, worker_id: &str) -> Result<Option<QueuedJob>>;

    /// Mark job `id` completed. Only the worker holding the claim may do
    /// so; a claim lost to a stall reclaim yields [`Error::NotFound`].
    async fn complete(&self, id: i64, worker_id: &str) -> Result<()>;

    /// Record a failed attempt, scheduling a retry when `error` allows it.
    /// Claim rules as for [`JobQueue::complete`].
    async fn fail(&self, id: i64, worker_id: &str, error: &Error) -> Result<FailureDisposition>;

    async fn get(&self, id: i64) -> Result<Option<QueuedJob>>;

    /// Newest first.
    async fn list(&self, status: Option<JobStatus>, limit: u32) -> Result<Vec<QueuedJob>>;

    async fn stats(&self) -> Result<QueueStats>;

    /// Return active jobs started more than `older_than` ago to waiting.
    async fn reclaim_stale(&self, older_than: Duration) -> Result<u64>;

    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            JobStatus::Waiting,
            JobStatus::Active,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().ok(), Some(status));
        }
        assert!("paused".parse::<JobStatus>().is_err());
    }

    #[test]
    fn retry_delay_doubles_per_attempt() {
        let delays: Vec<i64> = (1..=4).map(|a| retry_delay_ms(1_000, a)).collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000]);
        assert_eq!(retry_delay_ms(1_000, 0), 1_000);
    }

    #[test]
    fn options_follow_queue_config() {
        let options = EnqueueOptions::default();
        assert_eq!(options.delay, Duration::from_millis(1_000));
        assert_eq!(options.max_attempts, 3);
        assert_eq!(Retention::default().keep_failed, 50);
    }
}
