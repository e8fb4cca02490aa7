//! Document store port and local adapters.
//!
//! The remote store only has to support two calls: read a whole document and
//! shallow-merge top-level fields into it. `orderDetail` is always written as
//! one replacement value, so no adapter needs nested merge semantics.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::{Error, Result};

/// A document as the store returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub attributes: Map<String, Value>,
}

impl Document {
    #[must_use]
    pub fn new(id: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }

    /// Replace each top-level field present in `fields`.
    pub fn apply_fields(&mut self, fields: Map<String, Value>) {
        self.attributes.extend(fields);
    }
}

/// Remote document store.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn show(&self, id: &str) -> Result<Document>;

    /// Shallow-merge `fields` into the document and return the result.
    async fn update(&self, id: &str, fields: Map<String, Value>) -> Result<Document>;
}

// ═══════════════════════════════════════════════════════════════════════════
// IN-MEMORY
// ═══════════════════════════════════════════════════════════════════════════

/// In-process store. Clones share the same documents and counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    documents: Arc<Mutex<HashMap<String, Map<String, Value>>>>,
    show_calls: Arc<AtomicUsize>,
    update_calls: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a document.
    pub async fn insert(&self, document: Document) {
        self.documents
            .lock()
            .await
            .insert(document.id, document.attributes);
    }

    #[must_use]
    pub fn show_calls(&self) -> usize {
        self.show_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Make the next `count` calls fail with [`Error::RemoteStore`].
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    fn injected_failure(&self) -> Result<()> {
        let consumed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match consumed {
            Ok(_) => Err(Error::RemoteStore("injected failure".to_string())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn show(&self, id: &str) -> Result<Document> {
        self.show_calls.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()?;
        let documents = self.documents.lock().await;
        documents
            .get(id)
            .map(|attributes| Document::new(id, attributes.clone()))
            .ok_or_else(|| Error::NotFound(format!("document '{id}'")))
    }

    async fn update(&self, id: &str, fields: Map<String, Value>) -> Result<Document> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()?;
        let mut documents = self.documents.lock().await;
        let attributes = documents
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("document '{id}'")))?;
        attributes.extend(fields);
        Ok(Document::new(id, attributes.clone()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SQLITE
// ═══════════════════════════════════════════════════════════════════════════

/// Documents as JSON text in a `documents` table.
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    db: SqlitePool,
}

impl SqliteDocumentStore {
    #[must_use]
    pub const fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Initialize the documents table.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                attributes TEXT NOT NULL
            )",
        )
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Create or replace a document.
    pub async fn put(&self, document: &Document) -> Result<()> {
        let attributes = serde_json::to_string(&document.attributes)?;
        sqlx::query(
            "INSERT INTO documents (id, attributes) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET attributes = excluded.attributes",
        )
        .bind(&document.id)
        .bind(attributes)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

fn parse_attributes(id: &str, raw: &str) -> Result<Map<String, Value>> {
    serde_json::from_str(raw)
        .map_err(|e| Error::MalformedDocument(format!("document '{id}' is not a JSON object: {e}")))
}

#[async_trait::async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn show(&self, id: &str) -> Result<Document> {
        let row: Option<(String,)> = sqlx::query_as("SELECT attributes FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        let (raw,) = row.ok_or_else(|| Error::NotFound(format!("document '{id}'")))?;
        Ok(Document::new(id, parse_attributes(id, &raw)?))
    }

    async fn update(&self, id: &str, fields: Map<String, Value>) -> Result<Document> {
        let mut tx = self.db.begin().await?;

        let row: Option<(String,)> = sqlx::query_as("SELECT attributes FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let (raw,) = row.ok_or_else(|| Error::NotFound(format!("document '{id}'")))?;

        let mut document = Document::new(id, parse_attributes(id, &raw)?);
        document.apply_fields(fields);

        sqlx::query("UPDATE documents SET attributes = ? WHERE id = ?")
            .bind(serde_json::to_string(&document.attributes)?)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(document)
    }
}
