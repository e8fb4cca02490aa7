//! SQLite-backed [`JobQueue`].
//!
//! Dedup rides on a partial unique index: at most one `waiting` row per
//! `dedup_key`. Claiming is a single `UPDATE ... WHERE id = (SELECT ...)
//! RETURNING`, so two workers can never claim the same row.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::{sync::Arc, time::Duration};

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::{
    clock::Clock,
    model::PlanUpdate,
    queue::{
        retry_delay_ms, EnqueueOptions, Enqueued, FailureDisposition, JobQueue, JobStatus, NewJob,
        QueueStats, QueuedJob, Retention,
    },
    Error, Result,
};

const JOB_COLUMNS: &str = "id, dedup_key, payload, priority, status, attempts, max_attempts, \
     backoff_ms, run_at, created_at, started_at, finished_at, last_error, worker_id";

/// A newer job (waiting, or active with a higher id) shares this row's key.
const SUPERSEDED_BY_NEWER: &str = "EXISTS (SELECT 1 FROM plan_jobs AS other
     WHERE other.dedup_key = plan_jobs.dedup_key
       AND other.id != plan_jobs.id
       AND (other.status = 'waiting' OR (other.status = 'active' AND other.id > plan_jobs.id)))";

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::Parse(format!("{column} out of range: {value}")))
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct SqliteJobQueue {
    db: SqlitePool,
    clock: Arc<dyn Clock>,
    retention: Retention,
}

impl SqliteJobQueue {
    #[must_use]
    pub fn new(db: SqlitePool, clock: Arc<dyn Clock>, retention: Retention) -> Self {
        Self {
            db,
            clock,
            retention,
        }
    }

    /// Initialize the queue schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS plan_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                dedup_key TEXT NOT NULL,
                order_id TEXT NOT NULL,
                plan_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'waiting'
                    CHECK(status IN ('waiting', 'active', 'completed', 'failed')),
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL,
                backoff_ms INTEGER NOT NULL,
                run_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                started_at INTEGER,
                finished_at INTEGER,
                last_error TEXT,
                worker_id TEXT
            )",
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_plan_jobs_waiting_dedup
             ON plan_jobs(dedup_key) WHERE status = 'waiting'",
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_plan_jobs_due
             ON plan_jobs(status, priority DESC, run_at, id)",
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn prune(&self) -> Result<()> {
        for (status, keep) in [
            (JobStatus::Completed, self.retention.keep_completed),
            (JobStatus::Failed, self.retention.keep_failed),
        ] {
            let pruned = sqlx::query(
                "DELETE FROM plan_jobs WHERE status = ?1 AND id NOT IN (
                     SELECT id FROM plan_jobs WHERE status = ?1
                     ORDER BY finished_at DESC, id DESC LIMIT ?2
                 )",
            )
            .bind(status.as_str())
            .bind(i64::from(keep))
            .execute(&self.db)
            .await?
            .rows_affected();
            if pruned > 0 {
                tracing::debug!(%status, pruned, "pruned finished jobs");
            }
        }
        Ok(())
    }
}

fn job_from_row(row: &SqliteRow) -> Result<QueuedJob> {
    let id: i64 = row.try_get("id")?;
    let payload: String = row.try_get("payload")?;
    let update: PlanUpdate = serde_json::from_str(&payload)
        .map_err(|e| Error::Parse(format!("job {id} payload: {e}")))?;
    let status: String = row.try_get("status")?;

    Ok(QueuedJob {
        id,
        dedup_key: row.try_get("dedup_key")?,
        update,
        priority: row.try_get("priority")?,
        status: status.parse()?,
        attempts: to_u32(row.try_get("attempts")?, "attempts")?,
        max_attempts: to_u32(row.try_get("max_attempts")?, "max_attempts")?,
        backoff_ms: row.try_get("backoff_ms")?,
        run_at: row.try_get("run_at")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        last_error: row.try_get("last_error")?,
        worker_id: row.try_get("worker_id")?,
    })
}

#[async_trait::async_trait]
impl JobQueue for SqliteJobQueue {
    async fn enqueue_deduplicated(
        &self,
        job: NewJob,
        options: EnqueueOptions,
    ) -> Result<Option<Enqueued>> {
        let now = self.clock.now_millis();
        let run_at = now.saturating_add(millis(options.delay));
        let payload = serde_json::to_string(&job.update)?;

        let mut tx = self.db.begin().await?;

        let superseded = sqlx::query("DELETE FROM plan_jobs WHERE dedup_key = ? AND status = 'waiting'")
            .bind(&job.dedup_key)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let inserted = sqlx::query(
            "INSERT INTO plan_jobs
                 (dedup_key, order_id, plan_id, user_id, payload, priority,
                  max_attempts, backoff_ms, run_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&job.dedup_key)
        .bind(&job.update.order_id)
        .bind(&job.update.plan_id)
        .bind(&job.update.current_user_id)
        .bind(payload)
        .bind(job.priority)
        .bind(i64::from(options.max_attempts))
        .bind(millis(options.backoff))
        .bind(run_at)
        .bind(now)
        .execute(&mut *tx)
        .await;

        let id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                tx.rollback().await?;
                tracing::debug!(dedup_key = %job.dedup_key, "enqueue lost a dedup race");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        tx.commit().await?;

        tracing::debug!(
            job_id = id,
            plan_id = %job.update.plan_id,
            user = %job.update.current_user_id,
            superseded,
            run_at,
            "job enqueued"
        );
        Ok(Some(Enqueued {
            id,
            run_at,
            superseded,
        }))
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<QueuedJob>> {
        let now = self.clock.now_millis();
        let row = sqlx::query(&format!(
            "UPDATE plan_jobs
             SET status = 'active', attempts = attempts + 1, started_at = ?1, worker_id = ?2
             WHERE status = 'waiting' AND id = (
                 SELECT j.id FROM plan_jobs AS j
                 WHERE j.status = 'waiting' AND j.run_at <= ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM plan_jobs AS a
                       WHERE a.dedup_key = j.dedup_key AND a.status = 'active'
                   )
                 ORDER BY j.priority DESC, j.run_at ASC, j.id ASC
                 LIMIT 1
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(now)
        .bind(worker_id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn complete(&self, id: i64, worker_id: &str) -> Result<()> {
        let done = sqlx::query(
            "UPDATE plan_jobs SET status = 'completed', finished_at = ?
             WHERE id = ? AND status = 'active' AND worker_id = ?",
        )
        .bind(self.clock.now_millis())
        .bind(id)
        .bind(worker_id)
        .execute(&self.db)
        .await?
        .rows_affected();

        if done == 0 {
            return Err(Error::NotFound(format!("active job {id} claimed by {worker_id}")));
        }
        self.prune().await
    }

    async fn fail(&self, id: i64, worker_id: &str, error: &Error) -> Result<FailureDisposition> {
        let now = self.clock.now_millis();
        let message = error.to_string();
        let mut tx = self.db.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM plan_jobs
             WHERE id = ? AND status = 'active' AND worker_id = ?"
        ))
        .bind(id)
        .bind(worker_id)
        .fetch_optional(&mut *tx)
        .await?;
        let job = row
            .as_ref()
            .map(job_from_row)
            .transpose()?
            .ok_or_else(|| Error::NotFound(format!("active job {id} claimed by {worker_id}")))?;

        let disposition = if error.is_retryable() && job.attempts < job.max_attempts {
            let dropped = sqlx::query(&format!(
                "DELETE FROM plan_jobs WHERE id = ? AND {SUPERSEDED_BY_NEWER}"
            ))
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if dropped > 0 {
                FailureDisposition::Superseded
            } else {
                let run_at = now.saturating_add(retry_delay_ms(job.backoff_ms, job.attempts));
                sqlx::query(
                    "UPDATE plan_jobs
                     SET status = 'waiting', run_at = ?, last_error = ?,
                         started_at = NULL, worker_id = NULL
                     WHERE id = ?",
                )
                .bind(run_at)
                .bind(&message)
                .bind(id)
                .execute(&mut *tx)
                .await?;
                FailureDisposition::Retrying {
                    run_at,
                    attempts: job.attempts,
                }
            }
        } else {
            sqlx::query(
                "UPDATE plan_jobs SET status = 'failed', finished_at = ?, last_error = ?
                 WHERE id = ?",
            )
            .bind(now)
            .bind(&message)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            FailureDisposition::Failed {
                attempts: job.attempts,
            }
        };
        tx.commit().await?;

        if matches!(disposition, FailureDisposition::Failed { .. }) {
            self.prune().await?;
        }
        Ok(disposition)
    }

    async fn get(&self, id: i64) -> Result<Option<QueuedJob>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM plan_jobs WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn list(&self, status: Option<JobStatus>, limit: u32) -> Result<Vec<QueuedJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM plan_jobs
             WHERE ?1 IS NULL OR status = ?1
             ORDER BY id DESC LIMIT ?2"
        ))
        .bind(status.map(JobStatus::as_str))
        .bind(i64::from(limit))
        .fetch_all(&self.db)
        .await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn stats(&self) -> Result<QueueStats> {
        let (waiting, delayed, active, completed, failed): (i64, i64, i64, i64, i64) =
            sqlx::query_as(
                "SELECT
                     COALESCE(SUM(status = 'waiting'), 0),
                     COALESCE(SUM(status = 'waiting' AND run_at > ?), 0),
                     COALESCE(SUM(status = 'active'), 0),
                     COALESCE(SUM(status = 'completed'), 0),
                     COALESCE(SUM(status = 'failed'), 0)
                 FROM plan_jobs",
            )
            .bind(self.clock.now_millis())
            .fetch_one(&self.db)
            .await?;

        Ok(QueueStats {
            waiting: to_u64(waiting),
            delayed: to_u64(delayed),
            active: to_u64(active),
            completed: to_u64(completed),
            failed: to_u64(failed),
        })
    }

    async fn reclaim_stale(&self, older_than: Duration) -> Result<u64> {
        let now = self.clock.now_millis();
        let cutoff = now.saturating_sub(millis(older_than));
        let mut tx = self.db.begin().await?;

        let dropped = sqlx::query(&format!(
            "DELETE FROM plan_jobs
             WHERE status = 'active' AND started_at < ? AND {SUPERSEDED_BY_NEWER}"
        ))
        .bind(cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        // The stalled attempt is handed back, not counted.
        let reclaimed = sqlx::query(
            "UPDATE plan_jobs
             SET status = 'waiting', attempts = MAX(attempts - 1, 0), run_at = ?,
                 started_at = NULL, worker_id = NULL,
                 last_error = 'stalled: worker stopped responding'
             WHERE status = 'active' AND started_at < ?",
        )
        .bind(now)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;

        if reclaimed > 0 || dropped > 0 {
            tracing::warn!(reclaimed, dropped, "reclaimed stalled jobs");
        }
        Ok(reclaimed)
    }

    async fn close(&self) {
        self.db.close().await;
    }
}
