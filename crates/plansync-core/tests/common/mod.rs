//! Common fixtures for plansync-core integration tests
//!
//! Each test gets its own in-memory SQLite database, a seeded in-memory
//! document store holding order `o1` and plan `p1`, and helpers for polling
//! the queue until the pool has done its work.

#![allow(dead_code)]

use std::{future::Future, sync::Arc, time::Duration};

use plansync_core::{
    Document, JobQueue, LockConfig, MemberOrder, MemoryDocumentStore, PlanPayload, PlanUpdate,
    Result, Retention, SqliteJobQueue, SystemClock,
};
use serde_json::{json, Map, Value};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

pub const ORDER_ID: &str = "o1";
pub const PLAN_ID: &str = "p1";
pub const DAY: &str = "1700000000000";

pub async fn memory_pool() -> Result<SqlitePool> {
    Ok(SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?)
}

pub async fn memory_queue() -> Result<Arc<SqliteJobQueue>> {
    let queue = SqliteJobQueue::new(memory_pool().await?, Arc::new(SystemClock), Retention::default());
    queue.init().await?;
    Ok(Arc::new(queue))
}

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected JSON object, got {other}"),
    }
}

/// Order `o1` with the given participants and plan `p1` with an empty
/// `orderDetail` plus an unrelated field that must survive every write.
pub async fn seeded_documents(participants: &[&str]) -> MemoryDocumentStore {
    let store = MemoryDocumentStore::new();
    store
        .insert(Document::new(
            ORDER_ID,
            object(json!({ "participants": participants, "anonymous": [] })),
        ))
        .await;
    store
        .insert(Document::new(
            PLAN_ID,
            object(json!({ "title": "Team lunch", "orderDetail": {} })),
        ))
        .await;
    store
}

pub fn single_date(user: &str, food: &str) -> PlanUpdate {
    PlanUpdate {
        order_id: ORDER_ID.to_string(),
        plan_id: PLAN_ID.to_string(),
        current_user_id: user.to_string(),
        payload: PlanPayload::SingleDate {
            order_day: DAY.to_string(),
            member_orders: MemberOrder::joined(food),
        },
    }
}

/// Short, jittered backoff with a deep retry budget for contention tests.
pub fn contended_lock_config() -> LockConfig {
    LockConfig {
        retry_delay_ms: 2,
        factor: 2,
        max_delay_ms: 20,
        max_retries: 500,
        jitter: true,
        ..LockConfig::default()
    }
}

/// `memberOrders` of `DAY` in plan `p1`.
pub async fn member_orders(store: &MemoryDocumentStore) -> Result<Map<String, Value>> {
    use plansync_core::DocumentStore;

    let plan = store.show(PLAN_ID).await?;
    Ok(plan.attributes["orderDetail"][DAY]["memberOrders"]
        .as_object()
        .cloned()
        .unwrap_or_default())
}

/// Poll `check` every 10ms until it returns true or `timeout` passes.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Wait until the queue holds no waiting or active jobs.
pub async fn wait_for_drain(queue: &dyn JobQueue, timeout: Duration) -> bool {
    wait_until(timeout, || async {
        queue
            .stats()
            .await
            .map(|s| s.waiting == 0 && s.active == 0)
            .unwrap_or(false)
    })
    .await
}
