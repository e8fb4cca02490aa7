#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::too_many_lines
)]
//! End-to-end: gateway -> queue -> worker pool -> plan writer.

mod common;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use common::{
    contended_lock_config, member_orders, memory_queue, seeded_documents, single_date,
    wait_for_drain, wait_until,
};
use plansync_core::{
    EnqueueOptions, Error, JobExecutor, JobQueue, JobStatus, MemoryLockStore, PlanUpdate,
    PlanWriter, PoolConfig, Result, SubmissionGateway, SystemClock, WorkerPool,
};
use serde_json::json;
use tokio::sync::{mpsc, Semaphore};

fn fast_pool(concurrency: usize) -> PoolConfig {
    PoolConfig {
        concurrency,
        poll_interval: Duration::from_millis(10),
        stall_after: Duration::from_secs(60),
        sweep_interval: Duration::from_secs(30),
        shutdown_timeout: None,
        worker_prefix: "test-worker".to_string(),
    }
}

fn options(delay_ms: u64, attempts: u32) -> EnqueueOptions {
    EnqueueOptions {
        delay: Duration::from_millis(delay_ms),
        max_attempts: attempts,
        backoff: Duration::from_millis(10),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn resubmission_within_debounce_window_runs_once_with_latest_selection() -> Result<()> {
    let queue = memory_queue().await?;
    let store = seeded_documents(&["u1"]).await;
    let writer = Arc::new(PlanWriter::new(
        Arc::new(MemoryLockStore::new(Arc::new(SystemClock))),
        Arc::new(store.clone()),
        contended_lock_config(),
    ));
    let gateway = SubmissionGateway::new(queue.clone(), options(300, 3));

    let pool = WorkerPool::start(queue.clone(), writer, fast_pool(3));

    let first = gateway.submit(single_date("u1", "pho")).await?.unwrap();
    let second = gateway.submit(single_date("u1", "banh-mi")).await?.unwrap();
    assert_eq!(second.superseded, 1);
    assert!(queue.get(first.job_id).await?.is_none());

    assert!(wait_until(Duration::from_secs(5), || async {
        queue.stats().await.map(|s| s.completed == 1).unwrap_or(false)
    })
    .await);
    assert!(wait_for_drain(queue.as_ref(), Duration::from_secs(1)).await);

    let orders = member_orders(&store).await?;
    assert_eq!(orders["u1"]["foodId"], json!("banh-mi"));
    // One plan write: the first submission never executed.
    assert_eq!(store.update_calls(), 1);

    let report = pool.stop().await;
    assert_eq!(report.completed, 1);
    assert_eq!(report.failed, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_participants_through_the_pool_lose_nothing() -> Result<()> {
    let queue = memory_queue().await?;
    let users: Vec<String> = (0..12).map(|i| format!("u{i}")).collect();
    let user_refs: Vec<&str> = users.iter().map(String::as_str).collect();
    let store = seeded_documents(&user_refs).await;
    let writer = Arc::new(PlanWriter::new(
        Arc::new(MemoryLockStore::new(Arc::new(SystemClock))),
        Arc::new(store.clone()),
        contended_lock_config(),
    ));
    let gateway = SubmissionGateway::new(queue.clone(), options(0, 5));
    let pool = WorkerPool::start(queue.clone(), writer, fast_pool(5));

    for user in &users {
        gateway.submit(single_date(user, &format!("{user}-food"))).await?;
    }
    assert!(wait_until(Duration::from_secs(10), || async {
        queue.stats().await.map(|s| s.completed == 12).unwrap_or(false)
    })
    .await);

    let orders = member_orders(&store).await?;
    assert_eq!(orders.len(), 12);
    for user in &users {
        assert_eq!(orders[user]["foodId"], json!(format!("{user}-food")));
    }
    pool.stop().await;
    Ok(())
}

/// Blocks every execution on a semaphore and reports when it starts.
struct GatedExecutor {
    started: mpsc::UnboundedSender<String>,
    gate: Arc<Semaphore>,
    executions: AtomicUsize,
}

#[async_trait::async_trait]
impl JobExecutor for GatedExecutor {
    async fn execute(&self, update: &PlanUpdate) -> Result<()> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let _ = self.started.send(update.current_user_id.clone());
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| Error::RemoteStore(e.to_string()))?;
        permit.forget();
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_waits_for_in_flight_job_and_claims_nothing_new() -> Result<()> {
    let queue = memory_queue().await?;
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let gate = Arc::new(Semaphore::new(0));
    let executor = Arc::new(GatedExecutor {
        started: started_tx,
        gate: gate.clone(),
        executions: AtomicUsize::new(0),
    });
    let gateway = SubmissionGateway::new(queue.clone(), options(0, 3));

    let pool = WorkerPool::start(queue.clone(), executor.clone(), fast_pool(2));
    gateway.submit(single_date("u1", "f1")).await?;
    assert_eq!(started_rx.recv().await.as_deref(), Some("u1"));
    assert_eq!(pool.in_flight().count().await, 1);

    let stopping = tokio::spawn(pool.stop());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!stopping.is_finished(), "stop returned while a job was running");

    // Submitted after stop began: must not be claimed.
    gateway.submit(single_date("u2", "f2")).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    gate.add_permits(1);
    let report = stopping.await.unwrap();

    assert_eq!(report.in_flight_at_stop, 1);
    assert_eq!(report.completed, 1);
    assert!(report.abandoned.is_empty());
    assert_eq!(executor.executions.load(Ordering::SeqCst), 1);
    assert!(started_rx.try_recv().is_err());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_timeout_abandons_stuck_jobs() -> Result<()> {
    let queue = memory_queue().await?;
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let executor = Arc::new(GatedExecutor {
        started: started_tx,
        gate: Arc::new(Semaphore::new(0)),
        executions: AtomicUsize::new(0),
    });
    let gateway = SubmissionGateway::new(queue.clone(), options(0, 3));
    let mut config = fast_pool(1);
    config.shutdown_timeout = Some(Duration::from_millis(100));

    let pool = WorkerPool::start(queue.clone(), executor, config);
    let job = gateway.submit(single_date("u1", "f1")).await?.unwrap();
    started_rx.recv().await;

    let report = pool.stop().await;
    assert_eq!(report.completed, 0);
    assert_eq!(report.abandoned.len(), 1);
    assert_eq!(report.abandoned[0].job_id, job.job_id);
    Ok(())
}

/// Fails every execution with a fixed error.
struct FailingExecutor {
    error: Error,
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl JobExecutor for FailingExecutor {
    async fn execute(&self, _update: &PlanUpdate) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn retryable_failure_uses_exactly_the_attempt_budget() -> Result<()> {
    let queue = memory_queue().await?;
    let executor = Arc::new(FailingExecutor {
        error: Error::LockNotAcquired {
            resource: "plan:p1".to_string(),
            attempts: 11,
        },
        calls: AtomicUsize::new(0),
    });
    let gateway = SubmissionGateway::new(queue.clone(), options(0, 3));
    let pool = WorkerPool::start(queue.clone(), executor.clone(), fast_pool(2));

    let job = gateway.submit(single_date("u1", "f1")).await?.unwrap();
    assert!(wait_until(Duration::from_secs(5), || async {
        matches!(
            queue.get(job.job_id).await,
            Ok(Some(ref j)) if j.status == JobStatus::Failed
        )
    })
    .await);

    let failed = queue.get(job.job_id).await?.unwrap();
    assert_eq!(failed.attempts, 3);
    assert!(failed.last_error.unwrap().contains("not acquired"));
    assert_eq!(executor.calls.load(Ordering::SeqCst), 3);

    let report = pool.stop().await;
    assert_eq!(report.retried, 2);
    assert_eq!(report.failed, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_retryable_failure_fails_on_first_attempt() -> Result<()> {
    let queue = memory_queue().await?;
    let executor = Arc::new(FailingExecutor {
        error: Error::MalformedDocument("orderDetail is a string".to_string()),
        calls: AtomicUsize::new(0),
    });
    let gateway = SubmissionGateway::new(queue.clone(), options(0, 3));
    let pool = WorkerPool::start(queue.clone(), executor.clone(), fast_pool(1));

    let job = gateway.submit(single_date("u1", "f1")).await?.unwrap();
    assert!(wait_until(Duration::from_secs(5), || async {
        queue.stats().await.map(|s| s.failed == 1).unwrap_or(false)
    })
    .await);

    assert_eq!(queue.get(job.job_id).await?.unwrap().attempts, 1);
    assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    pool.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transient_store_outage_is_retried_to_success() -> Result<()> {
    let queue = memory_queue().await?;
    let store = seeded_documents(&["u1"]).await;
    store.fail_next(1);
    let writer = Arc::new(PlanWriter::new(
        Arc::new(MemoryLockStore::new(Arc::new(SystemClock))),
        Arc::new(store.clone()),
        contended_lock_config(),
    ));
    let gateway = SubmissionGateway::new(queue.clone(), options(0, 3));
    let pool = WorkerPool::start(queue.clone(), writer, fast_pool(1));

    let job = gateway.submit(single_date("u1", "f1")).await?.unwrap();
    assert!(wait_until(Duration::from_secs(5), || async {
        queue.stats().await.map(|s| s.completed == 1).unwrap_or(false)
    })
    .await);

    assert_eq!(queue.get(job.job_id).await?.unwrap().attempts, 2);
    assert_eq!(member_orders(&store).await?["u1"]["foodId"], json!("f1"));
    let report = pool.stop().await;
    assert_eq!(report.retried, 1);
    assert_eq!(report.completed, 1);
    Ok(())
}
