//! # Plansync Core
//!
//! Write-coordination pipeline for shared group-order plans. Many participants
//! submit selections into one plan document; this crate makes those concurrent
//! per-participant writes safe.
//!
//! ## Pipeline
//!
//! ```text
//! SubmissionGateway -> JobQueue -> WorkerPool -> PlanWriter
//!                                                  |- lock::acquire("plan:<id>")
//!                                                  |- DocumentStore::show (fresh read)
//!                                                  |- merge::apply_contribution
//!                                                  |- DocumentStore::update
//!                                                  '- lock::release
//! ```
//!
//! ## Laws (Compiler Enforced)
//!
//! - No `unwrap()` - returns `Result` instead
//! - No `expect()` - returns `Result` instead
//! - No `panic!()` - returns `Result` instead
//! - No `unsafe` - safe Rust only
//!
//! ## Error Handling
//!
//! All fallible operations return `Result<T, Error>`. Errors know whether a
//! failed job may be retried ([`Error::is_retryable`]); the queue uses that to
//! decide between backoff and the failed-job record.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod document_store;
pub mod error;
pub mod gateway;
pub mod http_store;
pub mod lock;
pub mod lock_store;
pub mod merge;
pub mod model;
pub mod pool;
pub mod queue;
pub mod queue_store;
pub mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, LockConfig, QueueConfig, StoreConfig, StoreKind, WorkerConfig};
pub use document_store::{Document, DocumentStore, MemoryDocumentStore, SqliteDocumentStore};
pub use error::{Error, Result};
pub use gateway::{compute_dedup_key, SubmissionGateway, SubmittedJob};
pub use http_store::HttpDocumentStore;
pub use lock::{Lock, LockHolder, LockStore, LockToken, RetryPolicy};
pub use lock_store::{MemoryLockStore, SqliteLockStore};
pub use merge::MergeOutcome;
pub use model::{
    MemberOrder, MemberOrderStatus, OrderDetail, OrderDocument, PlanDocument, PlanPayload,
    PlanUpdate,
};
pub use pool::{InFlightJob, InFlightTracker, PoolConfig, ShutdownReport, WorkerPool};
pub use queue::{
    EnqueueOptions, Enqueued, FailureDisposition, JobQueue, JobStatus, NewJob, QueueStats,
    QueuedJob, Retention,
};
pub use queue_store::SqliteJobQueue;
pub use worker::{JobExecutor, PlanWriter};
