//! Queue command implementation
//!
//! Read-only views of the job queue plus a manual stall sweep.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::time::Duration;

use anyhow::Result;
use plansync_core::{JobQueue, JobStatus};
use serde_json::json;

use super::{print_json, GlobalOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueAction {
    Stats,
    List {
        status: Option<JobStatus>,
        limit: u32,
    },
    Show {
        id: i64,
    },
    Reclaim {
        older_than: Option<Duration>,
    },
}

/// Run the queue command
///
/// # Errors
///
/// Returns an error if the queue cannot be opened, or `show` names an
/// unknown job.
pub async fn run(global: &GlobalOptions, action: &QueueAction) -> Result<()> {
    let (config, db) = global.open().await?;
    let queue = db.job_queue(&config).await?;

    match action {
        QueueAction::Stats => print_json(&queue.stats().await?, global.pretty),
        QueueAction::List { status, limit } => {
            let jobs = queue.list(*status, *limit).await?;
            print_json(&jobs, global.pretty)
        }
        QueueAction::Show { id } => match queue.get(*id).await? {
            Some(job) => print_json(&job, global.pretty),
            None => anyhow::bail!("job {id} not found"),
        },
        QueueAction::Reclaim { older_than } => {
            let threshold =
                older_than.unwrap_or_else(|| config.worker.stall_after(config.lock.ttl()));
            let reclaimed = queue.reclaim_stale(threshold).await?;
            tracing::info!(reclaimed, ?threshold, "stall sweep finished");
            print_json(&json!({ "reclaimed": reclaimed }), global.pretty)
        }
    }
}
