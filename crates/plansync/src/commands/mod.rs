//! Commands module for plansync CLI
//!
//! Provides command implementations for the worker, submissions, and queue,
//! lock and document inspection.

pub mod doc;
pub mod lock;
pub mod queue;
pub mod submit;
pub mod work;

use std::{
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use plansync_core::{config::load_config, Config};
use serde::Serialize;

use crate::db::PlansyncDb;

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub database: Option<String>,
    pub pretty: bool,
}

impl GlobalOptions {
    /// Load config (flags win over files and environment) and open the database.
    pub async fn open(&self) -> Result<(Config, PlansyncDb)> {
        let mut config = load_config(self.config.as_deref())?;
        if let Some(url) = &self.database {
            config.database_url.clone_from(url);
        }
        let db = PlansyncDb::connect(&config.database_url).await?;
        Ok((config, db))
    }
}

/// Write `value` to stdout as a single JSON document.
pub fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{rendered}");
    Ok(())
}

/// Read a whole file, or stdin when `path` is `-`.
pub fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read stdin")?;
        Ok(buffer)
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))
    }
}
