//! Work command implementation
//!
//! Runs the worker pool until the process is asked to stop, then drains
//! in-flight jobs and prints the shutdown report.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use plansync_core::{PlanWriter, PoolConfig, WorkerPool};

use super::{print_json, GlobalOptions};

#[derive(Debug, Clone, Default)]
pub struct WorkOptions {
    /// Overrides `worker.concurrency`.
    pub concurrency: Option<usize>,
    pub shutdown_timeout: Option<Duration>,
}

/// Run the work command
///
/// # Errors
///
/// Returns an error if config fails to load or the stores cannot be opened.
pub async fn run(global: &GlobalOptions, options: &WorkOptions) -> Result<()> {
    let (mut config, db) = global.open().await?;
    if let Some(concurrency) = options.concurrency {
        anyhow::ensure!(concurrency > 0, "--concurrency must be at least 1");
        config.worker.concurrency = concurrency;
    }

    let locks = Arc::new(db.lock_store().await?);
    let documents = db.document_store(&config).await?;
    let queue = Arc::new(db.job_queue(&config).await?);
    let writer = Arc::new(PlanWriter::new(locks, documents, config.lock.clone()));

    let mut pool_config = PoolConfig::from_config(&config.worker, &config.lock);
    pool_config.shutdown_timeout = options.shutdown_timeout;

    tracing::info!(
        database = %config.database_url,
        store = %config.store.kind,
        concurrency = pool_config.concurrency,
        "starting workers"
    );
    let pool = WorkerPool::start(queue, writer, pool_config);

    wait_for_shutdown_signal().await;

    let report = pool.stop().await;
    print_json(&report, global.pretty)
}

/// Resolves on the first SIGTERM or SIGINT.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).ok();
    let mut sigint = signal(SignalKind::interrupt()).ok();

    tokio::select! {
        () = async {
            if let Some(ref mut sig) = sigterm {
                sig.recv().await;
            } else {
                std::future::pending::<()>().await;
            }
        } => {
            tracing::info!("received SIGTERM, stopping workers");
        }
        () = async {
            if let Some(ref mut sig) = sigint {
                sig.recv().await;
            } else {
                std::future::pending::<()>().await;
            }
        } => {
            tracing::info!("received SIGINT, stopping workers");
        }
    }
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("received Ctrl+C, stopping workers");
    } else {
        std::future::pending::<()>().await;
    }
}
