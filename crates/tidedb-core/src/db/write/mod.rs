//! Module: write
//! Responsibility: classify a write batch against the current persisted state.
//! Does not own: persistence, index maintenance or change-stream delivery.
//! Boundary: pure function; every storage backend shares these conflict semantics.

mod event;


pub use event::{ChangeEvent, ChangeOperation, Checkpoint, EventBulk};

use crate::{
    document::{Document, Revision},
    error::{ErrorClass, InternalError},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tidedb_schema::path::FieldPath;
use ulid::Ulid;

/// Status carried by a revision conflict.
pub const CONFLICT_STATUS: u16 = 409;

///
/// BulkWriteRow
///
/// Proposed write. `previous` is the writer's assumption of the current
/// state; `None` asserts that the document does not exist yet.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct BulkWriteRow {
    pub document: Document,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Document>,
}

impl BulkWriteRow {
    #[must_use]
    pub const fn insert(document: Document) -> Self {
        Self {
            document,
            previous: None,
        }
    }

    #[must_use]
    pub const fn update(previous: Document, document: Document) -> Self {
        Self {
            document,
            previous: Some(previous),
        }
    }
}

///
/// WriteError
///
/// Per-document conflict: the assumed previous state did not match reality.
/// Carries the real current document so the caller can re-derive its write.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteError {
    pub status: u16,
    pub document_id: String,
    pub write_row: BulkWriteRow,
    pub document_in_db: Document,
}

impl WriteError {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        ErrorClass::Conflict
    }

    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        self.status == CONFLICT_STATUS
    }
}

///
/// CategorizedBatch
///
/// Output of one categorization; consumed immediately by the persistence step.
///

#[derive(Clone, Debug)]
pub struct CategorizedBatch {
    pub bulk_insert_docs: Vec<BulkWriteRow>,
    pub bulk_update_docs: Vec<BulkWriteRow>,
    pub errors: Vec<WriteError>,
    pub event_bulk: EventBulk,
    pub newest_row: Option<BulkWriteRow>,
}

impl CategorizedBatch {
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.bulk_insert_docs.len() + self.bulk_update_docs.len()
    }
}

/// Classify `rows` against `docs_in_db`, a snapshot of the current state of
/// every id the batch touches.
///
/// Rows are processed in order and later rows see the effect of earlier
/// successful rows for the same id. A declared `previous` must match the
/// current revision exactly, and the new revision height must then be
/// exactly one above it; a height mismatch aborts the whole call.
pub fn categorize_bulk_write_rows(
    primary_key: &FieldPath,
    docs_in_db: &HashMap<String, Document>,
    rows: Vec<BulkWriteRow>,
    context: &str,
) -> Result<CategorizedBatch, InternalError> {
    let bulk_id = Ulid::new().to_string();
    let mut batch = CategorizedBatch {
        bulk_insert_docs: Vec::new(),
        bulk_update_docs: Vec::new(),
        errors: Vec::new(),
        event_bulk: EventBulk {
            id: bulk_id.clone(),
            events: Vec::new(),
            checkpoint: None,
            context: context.to_string(),
        },
        newest_row: None,
    };

    // ids written earlier in this batch shadow the snapshot
    let mut written: HashMap<String, Document> = HashMap::new();

    for (row_index, row) in rows.into_iter().enumerate() {
        let doc_id = row.document.require_primary_key(primary_key)?.to_string();
        let current = written.get(&doc_id).or_else(|| docs_in_db.get(&doc_id));

        let Some(current) = current else {
            if let Some(previous) = &row.previous {
                check_revision_height(&doc_id, previous, &row.document)?;
            }

            if !row.document.is_deleted() {
                batch.event_bulk.events.push(ChangeEvent {
                    event_id: ChangeEvent::event_id(&bulk_id, row_index, &doc_id, &row.document),
                    document_id: doc_id.clone(),
                    operation: ChangeOperation::Insert,
                    document_data: row.document.clone(),
                    previous_document_data: row.previous.clone(),
                });
            }

            track_newest(&mut batch.newest_row, &row);
            written.insert(doc_id, row.document.clone());
            batch.bulk_insert_docs.push(row);
            continue;
        };

        let Some(previous) = row
            .previous
            .as_ref()
            .filter(|previous| previous.rev() == current.rev())
            .cloned()
        else {
            tracing::debug!(id = %doc_id, "write conflict");
            batch.errors.push(WriteError {
                status: CONFLICT_STATUS,
                document_id: doc_id,
                document_in_db: current.clone(),
                write_row: row,
            });
            continue;
        };

        check_revision_height(&doc_id, &previous, &row.document)?;

        let (operation, previous_data) = match (previous.is_deleted(), row.document.is_deleted()) {
            (_, true) => (ChangeOperation::Delete, Some(previous)),
            (true, false) => (ChangeOperation::Insert, None),
            (false, false) => (ChangeOperation::Update, Some(previous)),
        };
        batch.event_bulk.events.push(ChangeEvent {
            event_id: ChangeEvent::event_id(&bulk_id, row_index, &doc_id, &row.document),
            document_id: doc_id.clone(),
            operation,
            document_data: row.document.clone(),
            previous_document_data: previous_data,
        });

        track_newest(&mut batch.newest_row, &row);
        written.insert(doc_id, row.document.clone());
        batch.bulk_update_docs.push(row);
    }

    batch.event_bulk.checkpoint = batch.newest_row.as_ref().and_then(|row| {
        row.document
            .primary_key(primary_key)
            .map(|id| Checkpoint::new(id, row.document.lwt()))
    });

    Ok(batch)
}

fn track_newest(newest: &mut Option<BulkWriteRow>, row: &BulkWriteRow) {
    let replace = newest
        .as_ref()
        .is_none_or(|current| current.document.lwt() < row.document.lwt());
    if replace {
        *newest = Some(row.clone());
    }
}

// A writer that skips or repeats a height has broken revision bookkeeping.
fn check_revision_height(
    doc_id: &str,
    previous: &Document,
    document: &Document,
) -> Result<(), InternalError> {
    let (Some(previous_rev), Some(new_rev)) = (previous.revision()?, document.revision()?) else {
        return Err(InternalError::write_invariant(format!(
            "document '{doc_id}' is missing a revision on the previous or new state"
        )));
    };

    if new_rev.height() != previous_rev.height().saturating_add(1) {
        return Err(InternalError::write_invariant(format!(
            "document '{doc_id}' revision height {} does not follow {}",
            new_rev.height(),
            previous_rev.height(),
        )));
    }

    Ok(())
}

/// Stamp the next revision and last-write-time on `document`, relative to
/// `previous`.
#[must_use]
pub fn stamp_write(previous: Option<&Document>, document: Document, lwt: f64) -> Document {
    let previous_rev = previous.and_then(|doc| doc.revision().ok().flatten());
    let document = document.with_lwt(lwt);
    let revision = Revision::next_for(previous_rev.as_ref(), &document);

    document.with_revision(&revision)
}
