//! Document indexer.
//!
//! Called synchronously by the document lifecycle. Every write replaces the
//! document's index rows in one transaction.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use super::projection::{IndexEntry, project};
use crate::error::{SchemaError, SchemaResult};
use crate::models::{Blueprint, BlueprintId, DocRef, DocValue, doc_index};
use crate::schema::data_type::format_datetime;
use crate::schema::{IndexedScalar, PathTree};

/// A content document as handed over by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,

    /// Full blueprint resolved from the document's content type.
    pub blueprint_id: BlueprintId,

    pub data: Value,
}

/// Document lifecycle event.
#[derive(Debug, Clone)]
pub enum DocumentEvent {
    Created(Document),
    Updated(Document),
    Deleted(Uuid),
}

impl DocumentEvent {
    pub fn document_id(&self) -> Uuid {
        match self {
            Self::Created(doc) | Self::Updated(doc) => doc.id,
            Self::Deleted(id) => *id,
        }
    }
}

/// Rows written by one reindex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IndexReport {
    pub values: usize,
    pub refs: usize,
}

enum IndexRow {
    Value(DocValue),
    Ref(DocRef),
}

fn to_row(document_id: Uuid, entry: IndexEntry) -> IndexRow {
    let mut value = DocValue {
        document_id,
        path_id: entry.path_id,
        array_index: entry.array_index,
        value_string: None,
        value_int: None,
        value_float: None,
        value_bool: None,
        value_datetime: None,
    };

    match entry.value {
        IndexedScalar::String(s) => value.value_string = Some(s),
        IndexedScalar::Int(i) => value.value_int = Some(i),
        IndexedScalar::Float(f) => value.value_float = Some(f),
        IndexedScalar::Bool(b) => value.value_bool = Some(b),
        IndexedScalar::DateTime(ts) => value.value_datetime = Some(format_datetime(&ts)),
        IndexedScalar::Ref(target) => {
            return IndexRow::Ref(DocRef {
                document_id,
                path_id: entry.path_id,
                target_document_id: target,
                array_index: entry.array_index,
            });
        }
    }

    IndexRow::Value(value)
}

/// Service that keeps the typed document index in step with documents.
#[derive(Clone)]
pub struct DocumentIndexer {
    inner: Arc<IndexerInner>,
}

struct IndexerInner {
    pool: SqlitePool,
    max_depth: usize,
}

impl DocumentIndexer {
    pub fn new(pool: SqlitePool, max_depth: usize) -> Self {
        Self {
            inner: Arc::new(IndexerInner { pool, max_depth }),
        }
    }

    /// Recompute or remove the index rows of one document.
    pub async fn reindex(&self, event: DocumentEvent) -> SchemaResult<IndexReport> {
        match event {
            DocumentEvent::Deleted(id) => {
                let mut tx = self.inner.pool.begin().await?;
                doc_index::purge_document(&mut tx, id).await?;
                tx.commit().await?;

                info!(document_id = %id, "document removed from index");
                Ok(IndexReport::default())
            }
            DocumentEvent::Created(doc) | DocumentEvent::Updated(doc) => self.index(doc).await,
        }
    }

    async fn index(&self, doc: Document) -> SchemaResult<IndexReport> {
        let mut tx = self.inner.pool.begin().await?;

        let blueprint = Blueprint::get(&mut tx, doc.blueprint_id).await?;
        if blueprint.is_component() {
            return Err(SchemaError::validation(
                "blueprint_id",
                format!("'{}' is a component; documents need a full blueprint", blueprint.code),
            ));
        }

        let tree = PathTree::load(&mut tx, blueprint.id).await?;
        let entries = project(&tree, &doc.data, self.inner.max_depth)?;

        doc_index::purge_document(&mut tx, doc.id).await?;
        doc_index::register_document(&mut tx, doc.id, blueprint.id).await?;

        let mut report = IndexReport::default();
        for entry in entries {
            match to_row(doc.id, entry) {
                IndexRow::Value(value) => {
                    value.insert(&mut tx).await?;
                    report.values += 1;
                }
                IndexRow::Ref(reference) => {
                    reference.insert(&mut tx).await?;
                    report.refs += 1;
                }
            }
        }
        tx.commit().await?;

        debug!(
            document_id = %doc.id,
            blueprint = %blueprint.code,
            values = report.values,
            refs = report.refs,
            "document indexed"
        );
        Ok(report)
    }

    /// Value rows currently indexed for a document.
    pub async fn values_for(&self, document_id: Uuid) -> SchemaResult<Vec<DocValue>> {
        let mut conn = self.inner.pool.acquire().await?;
        DocValue::list_for_document(&mut conn, document_id).await
    }

    /// Reference rows currently indexed for a document.
    pub async fn refs_for(&self, document_id: Uuid) -> SchemaResult<Vec<DocRef>> {
        let mut conn = self.inner.pool.acquire().await?;
        DocRef::list_for_document(&mut conn, document_id).await
    }
}
