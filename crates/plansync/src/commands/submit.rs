//! Submit command implementation

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use plansync_core::{PlanUpdate, SubmissionGateway};
use serde_json::json;

use super::{print_json, read_input, GlobalOptions};

#[derive(Debug, Clone)]
pub struct SubmitOptions {
    /// Update JSON, `-` for stdin.
    pub file: PathBuf,
}

/// Parse a plan update and hand it to the gateway.
///
/// Prints the accepted job, or `{"accepted": false}` when a concurrent
/// submission for the same participant absorbed this one.
///
/// # Errors
///
/// Returns an error if the input is not a valid plan update or the queue
/// rejects it.
pub async fn run(global: &GlobalOptions, options: &SubmitOptions) -> Result<()> {
    let raw = read_input(&options.file)?;
    let update: PlanUpdate = serde_json::from_str(&raw).context("invalid plan update")?;

    let (config, db) = global.open().await?;
    let queue = Arc::new(db.job_queue(&config).await?);
    let gateway = SubmissionGateway::from_config(queue, &config.queue);

    match gateway.submit(update).await? {
        Some(job) => print_json(&job, global.pretty),
        None => print_json(&json!({ "accepted": false }), global.pretty),
    }
}
