//! Worker pool lifecycle.
//!
//! [`WorkerPool::start`] spawns `concurrency` workers and one stall sweeper.
//! [`WorkerPool::stop`] stops claiming, lets in-flight jobs finish, closes the
//! queue and reports what happened. Signal handling belongs to the caller.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use serde::Serialize;
use tokio::{
    sync::{watch, RwLock},
    task::JoinSet,
};

use crate::{
    config::{LockConfig, WorkerConfig},
    queue::{FailureDisposition, JobQueue, QueuedJob},
    worker::JobExecutor,
    Error,
};

// ═══════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub concurrency: usize,
    /// Idle sleep between empty polls.
    pub poll_interval: Duration,
    /// Active jobs older than this are handed back to the queue.
    pub stall_after: Duration,
    /// How often the sweeper looks for stalled jobs.
    pub sweep_interval: Duration,
    /// Upper bound on waiting for in-flight jobs in `stop`. `None` waits
    /// for them however long they take.
    pub shutdown_timeout: Option<Duration>,
    /// Worker ids are `{worker_prefix}-{n}`.
    pub worker_prefix: String,
}

impl PoolConfig {
    #[must_use]
    pub fn from_config(worker: &WorkerConfig, lock: &LockConfig) -> Self {
        let stall_after = worker.stall_after(lock.ttl());
        Self {
            concurrency: worker.concurrency,
            poll_interval: worker.poll_interval(),
            stall_after,
            sweep_interval: stall_after / 2,
            shutdown_timeout: None,
            worker_prefix: format!("worker-{}", std::process::id()),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default(), &LockConfig::default())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// IN-FLIGHT TRACKING
// ═══════════════════════════════════════════════════════════════════════════

/// A job a worker is currently executing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InFlightJob {
    pub job_id: i64,
    pub plan_id: String,
    pub worker_id: String,
}

/// Jobs currently executing across the pool.
#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    jobs: Arc<RwLock<Vec<InFlightJob>>>,
}

impl InFlightTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, job: InFlightJob) {
        self.jobs.write().await.push(job);
    }

    /// Remove a job by id.
    pub async fn release(&self, job_id: i64) -> Option<InFlightJob> {
        let mut jobs = self.jobs.write().await;
        let idx = jobs.iter().position(|j| j.job_id == job_id)?;
        Some(jobs.remove(idx))
    }

    pub async fn all(&self) -> Vec<InFlightJob> {
        self.jobs.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SHUTDOWN REPORT
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    superseded: AtomicU64,
}

/// Outcome of a pool's lifetime, returned by [`WorkerPool::stop`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub superseded: u64,
    /// Jobs executing when `stop` was called.
    pub in_flight_at_stop: usize,
    /// Jobs cut off by the shutdown timeout; they stay active until a sweeper
    /// reclaims them.
    pub abandoned: Vec<InFlightJob>,
}

// ═══════════════════════════════════════════════════════════════════════════
// POOL
// ═══════════════════════════════════════════════════════════════════════════

struct WorkerContext {
    worker_id: String,
    queue: Arc<dyn JobQueue>,
    executor: Arc<dyn JobExecutor>,
    tracker: InFlightTracker,
    counters: Arc<Counters>,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

/// A running set of workers.
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    tracker: InFlightTracker,
    counters: Arc<Counters>,
    shutdown: watch::Sender<bool>,
    tasks: JoinSet<()>,
    shutdown_timeout: Option<Duration>,
}

impl WorkerPool {
    /// Spawn the workers and the stall sweeper on the current runtime.
    #[must_use]
    pub fn start(
        queue: Arc<dyn JobQueue>,
        executor: Arc<dyn JobExecutor>,
        config: PoolConfig,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let tracker = InFlightTracker::new();
        let counters = Arc::new(Counters::default());
        let mut tasks = JoinSet::new();

        for n in 0..config.concurrency.max(1) {
            let ctx = WorkerContext {
                worker_id: format!("{}-{n}", config.worker_prefix),
                queue: queue.clone(),
                executor: executor.clone(),
                tracker: tracker.clone(),
                counters: counters.clone(),
                poll_interval: config.poll_interval,
                shutdown: shutdown_rx.clone(),
            };
            tasks.spawn(run_worker(ctx));
        }
        tasks.spawn(run_sweeper(
            queue.clone(),
            config.stall_after,
            config.sweep_interval.max(Duration::from_millis(10)),
            shutdown_rx,
        ));

        tracing::info!(
            concurrency = config.concurrency,
            stall_after = ?config.stall_after,
            "worker pool started"
        );
        Self {
            queue,
            tracker,
            counters,
            shutdown,
            tasks,
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Jobs currently executing.
    #[must_use]
    pub const fn in_flight(&self) -> &InFlightTracker {
        &self.tracker
    }

    /// Stop claiming, drain in-flight jobs, close the queue.
    pub async fn stop(mut self) -> ShutdownReport {
        let in_flight_at_stop = self.tracker.count().await;
        tracing::info!(in_flight = in_flight_at_stop, "stopping worker pool");
        self.shutdown.send_replace(true);

        let drained = match self.shutdown_timeout {
            Some(limit) => tokio::time::timeout(limit, drain(&mut self.tasks)).await.is_ok(),
            None => {
                drain(&mut self.tasks).await;
                true
            }
        };

        let abandoned = if drained {
            Vec::new()
        } else {
            self.tasks.abort_all();
            drain(&mut self.tasks).await;
            let abandoned = self.tracker.all().await;
            tracing::warn!(abandoned = abandoned.len(), "shutdown timed out with jobs in flight");
            abandoned
        };

        self.queue.close().await;

        let report = ShutdownReport {
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            retried: self.counters.retried.load(Ordering::SeqCst),
            superseded: self.counters.superseded.load(Ordering::SeqCst),
            in_flight_at_stop,
            abandoned,
        };
        tracing::info!(
            completed = report.completed,
            failed = report.failed,
            retried = report.retried,
            "worker pool stopped"
        );
        report
    }
}

async fn drain(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                tracing::error!(error = %e, "worker task panicked");
            }
        }
    }
}

/// Sleep for `interval` or until shutdown. Returns `true` on shutdown.
async fn idle(interval: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        () = tokio::time::sleep(interval) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

async fn run_worker(mut ctx: WorkerContext) {
    tracing::debug!(worker = %ctx.worker_id, "worker started");
    loop {
        if *ctx.shutdown.borrow() {
            break;
        }
        match ctx.queue.claim_next(&ctx.worker_id).await {
            Ok(Some(job)) => run_job(&ctx, job).await,
            Ok(None) => {
                if idle(ctx.poll_interval, &mut ctx.shutdown).await {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(worker = %ctx.worker_id, error = %e, "claim failed");
                if idle(ctx.poll_interval, &mut ctx.shutdown).await {
                    break;
                }
            }
        }
    }
    tracing::debug!(worker = %ctx.worker_id, "worker stopped");
}

async fn run_job(ctx: &WorkerContext, job: QueuedJob) {
    ctx.tracker
        .register(InFlightJob {
            job_id: job.id,
            plan_id: job.update.plan_id.clone(),
            worker_id: ctx.worker_id.clone(),
        })
        .await;
    tracing::debug!(
        worker = %ctx.worker_id,
        job_id = job.id,
        plan_id = %job.update.plan_id,
        attempt = job.attempts,
        "job claimed"
    );

    match ctx.executor.execute(&job.update).await {
        Ok(()) => match ctx.queue.complete(job.id, &ctx.worker_id).await {
            Ok(()) => {
                ctx.counters.completed.fetch_add(1, Ordering::SeqCst);
                tracing::info!(job_id = job.id, plan_id = %job.update.plan_id, "job completed");
            }
            Err(Error::NotFound(_)) => {
                tracing::warn!(job_id = job.id, worker = %ctx.worker_id, "claim was reclaimed before completion");
            }
            Err(e) => tracing::error!(job_id = job.id, error = %e, "failed to mark job completed"),
        },
        Err(error) => match ctx.queue.fail(job.id, &ctx.worker_id, &error).await {
            Ok(FailureDisposition::Retrying { run_at, attempts }) => {
                ctx.counters.retried.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(
                    job_id = job.id,
                    attempts,
                    run_at,
                    code = error.code(),
                    error = %error,
                    "job failed, retry scheduled"
                );
            }
            Ok(FailureDisposition::Failed { attempts }) => {
                ctx.counters.failed.fetch_add(1, Ordering::SeqCst);
                tracing::error!(
                    job_id = job.id,
                    attempts,
                    code = error.code(),
                    error = %error,
                    "job failed permanently"
                );
            }
            Ok(FailureDisposition::Superseded) => {
                ctx.counters.superseded.fetch_add(1, Ordering::SeqCst);
                tracing::info!(job_id = job.id, error = %error, "failed job superseded by a newer submission");
            }
            Err(Error::NotFound(_)) => {
                tracing::warn!(job_id = job.id, worker = %ctx.worker_id, "claim was reclaimed before failure was recorded");
            }
            Err(e) => tracing::error!(job_id = job.id, error = %e, "failed to record job failure"),
        },
    }

    ctx.tracker.release(job.id).await;
}

async fn run_sweeper(
    queue: Arc<dyn JobQueue>,
    stall_after: Duration,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    while !idle(interval, &mut shutdown).await {
        if let Err(e) = queue.reclaim_stale(stall_after).await {
            tracing::warn!(error = %e, "stall sweep failed");
        }
    }
}
