//! Module: storage
//! Responsibility: the uniform storage-instance contract and its
//! key-value implementation.
//! Does not own: write classification (`db::write`) or query execution
//! (`db::query`); instances compose both over a backend.
//! Boundary: collection and replication layers see only `StorageInstance`.

mod instance;
mod kv;
mod layout;
mod lifecycle;
mod registry;
mod stream;


pub use instance::KvStorageInstance;
pub use kv::{ApplyMode, KvBackend, KvBatch, KvOp, MemoryKv};
pub use lifecycle::LifecycleState;
pub use registry::{InstanceParams, KvStorage, KvStorageBuilder, MemoryStorage};
pub use stream::{ChangeStream, StreamEnd};

use crate::{
    db::{
        query::{PreparedQuery, QueryResult},
        write::{BulkWriteRow, Checkpoint, WriteError},
    },
    document::Document,
    error::InternalError,
};
use serde::{Deserialize, Serialize};
use tidedb_schema::Schema;

///
/// BulkWriteResponse
///
/// Conflicts are data, not `Err`: a batch with conflicts still succeeds
/// for every non-conflicting row.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct BulkWriteResponse {
    pub success: Vec<Document>,
    pub error: Vec<WriteError>,
}

///
/// ChangedDocuments
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ChangedDocuments {
    pub documents: Vec<Document>,

    /// Resume point: the last returned document, or the requested
    /// checkpoint when nothing changed.
    pub checkpoint: Option<Checkpoint>,
}

///
/// StorageInfo
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    /// Stored rows, tombstones included.
    pub total_count: usize,
}

///
/// StorageInstance
///
/// One open collection. Every backend exposes identical observable
/// semantics; after `close` every operation except `close` fails with a
/// `Closed` error.
///

pub trait StorageInstance: Send + Sync {
    fn database_name(&self) -> &str;

    fn collection_name(&self) -> &str;

    fn schema(&self) -> &Schema;

    /// Categorize, persist and announce one batch.
    fn bulk_write(
        &self,
        rows: Vec<BulkWriteRow>,
        context: &str,
    ) -> Result<BulkWriteResponse, InternalError>;

    /// Point reads by primary key; tombstones only with `with_deleted`.
    fn find_documents_by_id(
        &self,
        ids: &[&str],
        with_deleted: bool,
    ) -> Result<Vec<Document>, InternalError>;

    fn query(&self, prepared: &PreparedQuery) -> Result<QueryResult, InternalError>;

    /// Runs the query and counts the result; there is no native range count.
    fn count(&self, prepared: &PreparedQuery) -> Result<usize, InternalError>;

    /// Documents ordered by `(lwt, id)` strictly after `checkpoint`,
    /// tombstones included.
    fn changed_documents_since(
        &self,
        limit: usize,
        checkpoint: Option<&Checkpoint>,
    ) -> Result<ChangedDocuments, InternalError>;

    fn change_stream(&self) -> Result<ChangeStream, InternalError>;

    /// Replay retained bulks after `checkpoint`, then continue live.
    fn change_stream_from(&self, checkpoint: &Checkpoint) -> Result<ChangeStream, InternalError>;

    /// Purge tombstones older than `now - minimum_deleted_time`. Returns
    /// `true` when no eligible tombstone remains.
    fn cleanup(&self, minimum_deleted_time: f64) -> Result<bool, InternalError>;

    fn attachment_data(
        &self,
        document_id: &str,
        attachment_id: &str,
        digest: &str,
    ) -> Result<Vec<u8>, InternalError>;

    fn info(&self) -> Result<StorageInfo, InternalError>;

    /// Drain in-flight writes, complete this instance's streams. Idempotent.
    fn close(&self) -> Result<(), InternalError>;

    /// Delete every persisted row of the collection, then close.
    fn remove(&self) -> Result<(), InternalError>;
}
