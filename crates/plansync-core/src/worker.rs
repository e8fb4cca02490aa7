//! Job execution: the locked read-merge-write of one plan update.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::{
    config::LockConfig,
    document_store::DocumentStore,
    lock::{self, Lock, LockStore},
    merge::{self, MergeOutcome},
    model::{OrderDocument, PlanDocument, PlanUpdate},
    Error, Result,
};

/// Port run by the worker pool for every claimed job.
#[async_trait::async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, update: &PlanUpdate) -> Result<()>;
}

/// Writes one participant's contribution into a plan under the plan lock.
pub struct PlanWriter {
    locks: Arc<dyn LockStore>,
    documents: Arc<dyn DocumentStore>,
    lock_config: LockConfig,
}

impl PlanWriter {
    #[must_use]
    pub fn new(
        locks: Arc<dyn LockStore>,
        documents: Arc<dyn DocumentStore>,
        lock_config: LockConfig,
    ) -> Self {
        Self {
            locks,
            documents,
            lock_config,
        }
    }

    /// Acquire, read fresh, merge, write, release.
    ///
    /// The lock is always released; a failed or refused release is logged
    /// and does not change the result.
    ///
    /// # Errors
    ///
    /// - [`Error::LockNotAcquired`] when the plan stays locked
    /// - [`Error::LockLost`] when the lock could not be extended before the
    ///   write; nothing is written in that case
    /// - document store and merge errors as-is
    #[tracing::instrument(
        name = "plan_write",
        skip_all,
        fields(plan_id = %update.plan_id, user = %update.current_user_id)
    )]
    pub async fn write(&self, update: &PlanUpdate) -> Result<MergeOutcome> {
        let lock = Lock::for_plan(&update.plan_id, &self.lock_config);
        lock::acquire(self.locks.as_ref(), &lock).await?;
        let started = Instant::now();

        let result = self.write_locked(update, &lock, started).await;

        match lock::release(self.locks.as_ref(), &lock).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(resource = %lock.resource_key(), "lock was no longer held at release");
            }
            Err(e) => {
                tracing::warn!(resource = %lock.resource_key(), error = %e, "lock release failed");
            }
        }
        result
    }

    async fn write_locked(
        &self,
        update: &PlanUpdate,
        lock: &Lock,
        started: Instant,
    ) -> Result<MergeOutcome> {
        let order = OrderDocument::from_document(&self.documents.show(&update.order_id).await?)?;
        // Read the plan only now that the lock is held.
        let mut plan = PlanDocument::from_document(&self.documents.show(&update.plan_id).await?)?;

        let outcome = merge::apply_contribution(
            &mut plan.order_detail,
            &update.current_user_id,
            &update.payload,
        )?;

        if started.elapsed() > self.lock_config.extend_after()
            && !lock::extend(self.locks.as_ref(), lock, None).await?
        {
            return Err(Error::LockLost {
                resource: lock.resource_key().to_string(),
            });
        }

        self.documents
            .update(&update.plan_id, plan.order_detail_fields())
            .await?;

        if let Some(anonymous) = merge::roster_with_anonymous(&order, &update.current_user_id) {
            let mut fields = Map::new();
            fields.insert(
                OrderDocument::ANONYMOUS.to_string(),
                Value::from(anonymous),
            );
            self.documents.update(&update.order_id, fields).await?;
            tracing::debug!(order_id = %update.order_id, "added participant to anonymous roster");
        }

        tracing::info!(
            written = outcome.written.len(),
            skipped = outcome.skipped.len(),
            "plan updated"
        );
        Ok(outcome)
    }
}

#[async_trait::async_trait]
impl JobExecutor for PlanWriter {
    async fn execute(&self, update: &PlanUpdate) -> Result<()> {
        self.write(update).await.map(|_| ())
    }
}
