//! Submission gateway: validate a plan update, derive its dedup key and
//! enqueue it behind the debounce window.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{
    config::QueueConfig,
    model::{PlanPayload, PlanUpdate},
    queue::{EnqueueOptions, JobQueue, NewJob},
    Error, Result,
};

/// Stable key collapsing pending submissions by the same participant for
/// the same order and plan.
#[must_use]
pub fn compute_dedup_key(order_id: &str, plan_id: &str, user_id: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [order_id, plan_id, user_id] {
        hasher.update(part.as_bytes());
        hasher.update([0_u8]);
    }
    hex::encode(hasher.finalize())
}

/// What the gateway did with an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedJob {
    pub job_id: i64,
    pub dedup_key: String,
    pub priority: i64,
    pub run_at: i64,
    pub superseded: u64,
}

pub struct SubmissionGateway {
    queue: Arc<dyn JobQueue>,
    options: EnqueueOptions,
}

impl SubmissionGateway {
    #[must_use]
    pub fn new(queue: Arc<dyn JobQueue>, options: EnqueueOptions) -> Self {
        Self { queue, options }
    }

    #[must_use]
    pub fn from_config(queue: Arc<dyn JobQueue>, config: &QueueConfig) -> Self {
        Self::new(queue, EnqueueOptions::from(config))
    }

    /// Accept one participant's contribution.
    ///
    /// Returns `Ok(None)` when a concurrent submission for the same dedup key
    /// absorbed this one.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRequest`] for blank identifiers or an empty batch;
    /// queue errors are passed through.
    pub async fn submit(&self, update: PlanUpdate) -> Result<Option<SubmittedJob>> {
        validate(&update)?;

        let dedup_key =
            compute_dedup_key(&update.order_id, &update.plan_id, &update.current_user_id);
        let priority = i64::try_from(update.payload.batch_size()).unwrap_or(i64::MAX);
        let plan_id = update.plan_id.clone();

        let job = NewJob {
            dedup_key: dedup_key.clone(),
            update,
            priority,
        };
        let Some(enqueued) = self.queue.enqueue_deduplicated(job, self.options).await? else {
            tracing::info!(plan_id = %plan_id, dedup_key = %dedup_key, "submission absorbed by a concurrent one");
            return Ok(None);
        };

        tracing::info!(
            plan_id = %plan_id,
            job_id = enqueued.id,
            priority,
            superseded = enqueued.superseded,
            "plan update queued"
        );
        Ok(Some(SubmittedJob {
            job_id: enqueued.id,
            dedup_key,
            priority,
            run_at: enqueued.run_at,
            superseded: enqueued.superseded,
        }))
    }
}

fn validate(update: &PlanUpdate) -> Result<()> {
    for (field, value) in [
        ("orderId", &update.order_id),
        ("planId", &update.plan_id),
        ("currentUserId", &update.current_user_id),
    ] {
        if value.trim().is_empty() {
            return Err(Error::InvalidRequest(format!("{field} cannot be blank")));
        }
    }

    let dates = update.payload.dates();
    if dates.is_empty() {
        return Err(Error::InvalidRequest("orderDays cannot be empty".to_string()));
    }
    if dates.iter().any(|d| d.trim().is_empty()) {
        return Err(Error::InvalidRequest("date keys cannot be blank".to_string()));
    }
    Ok(())
}
