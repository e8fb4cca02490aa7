//! Document command implementation
//!
//! `show` reads through whichever store is configured; `put` seeds the
//! local SQLite store.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use plansync_core::{Document, DocumentStore, StoreKind};
use serde_json::{Map, Value};

use super::{print_json, read_input, GlobalOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocAction {
    Show { id: String },
    Put { id: String, file: PathBuf },
}

/// Run the doc command
///
/// # Errors
///
/// Returns an error if the document is missing, the input is not a JSON
/// object, or `put` is used against the HTTP store.
pub async fn run(global: &GlobalOptions, action: &DocAction) -> Result<()> {
    let (config, db) = global.open().await?;

    match action {
        DocAction::Show { id } => {
            let store = db.document_store(&config).await?;
            let document = store.show(id).await?;
            print_json(&document, global.pretty)
        }
        DocAction::Put { id, file } => {
            anyhow::ensure!(
                config.store.kind == StoreKind::Sqlite,
                "doc put only writes to the sqlite store (store.kind is {})",
                config.store.kind
            );
            let raw = read_input(file)?;
            let attributes: Map<String, Value> =
                serde_json::from_str(&raw).context("document attributes must be a JSON object")?;
            let document = Document::new(id.as_str(), attributes);
            db.sqlite_documents().await?.put(&document).await?;
            print_json(&document, global.pretty)
        }
    }
}
