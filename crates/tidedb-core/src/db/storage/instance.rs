//! Module: storage::instance
//! Responsibility: execute the storage contract over a `KvBackend`.
//! Does not own: conflict semantics (`db::write`) or plan execution
//! (`db::query`), only their persistence and consistency.
//! Boundary: writes go through the collection write queue; reads run
//! lock-free under the generation protocol.

use crate::{
    db::{
        index::{IndexBound, IndexDefinition, IndexScan, IndexSet, IndexableString},
        query::{IndexSource, PreparedQuery, QueryResult, ScanControl, execute_query},
        storage::{
            BulkWriteResponse, ChangedDocuments, StorageInfo, StorageInstance,
            kv::{KvBackend, KvBatch},
            layout::KeyLayout,
            lifecycle::{Lifecycle, LifecycleState},
            registry::{CollectionKey, CollectionState, StorageShared},
            stream::ChangeStream,
        },
        write::{BulkWriteRow, Checkpoint, categorize_bulk_write_rows},
    },
    document::Document,
    error::InternalError,
    obs::MetricsEvent,
    serialize::{deserialize_bounded, serialize_bounded},
};
use std::{collections::HashMap, sync::Arc};
use tidedb_schema::Schema;

/// Rows fetched per backend scan call.
const SCAN_CHUNK: usize = 64;

///
/// KvReader
///
/// Raw reads against one keyspace. Carries no consistency guarantee on its
/// own; callers wrap it in the generation protocol.
///

struct KvReader<'a, B> {
    backend: &'a B,
    layout: &'a KeyLayout,
    max_document_bytes: usize,
}

impl<B: KvBackend> KvReader<'_, B> {
    fn decode_id(bytes: Vec<u8>) -> Result<String, InternalError> {
        String::from_utf8(bytes).map_err(|err| {
            InternalError::store_corruption(format!("index row holds a non-UTF-8 key: {err}"))
        })
    }

    /// Visit every `(key, value)` in `[start, end)`, one chunk at a time.
    fn scan_raw(
        &self,
        start: Vec<u8>,
        end: &[u8],
        visit: &mut dyn FnMut(Vec<u8>, Vec<u8>) -> Result<ScanControl, InternalError>,
    ) -> Result<(), InternalError> {
        let mut cursor = start;
        loop {
            let rows = self.backend.scan(&cursor, Some(end), SCAN_CHUNK)?;
            let exhausted = rows.len() < SCAN_CHUNK;

            let mut last = None;
            for (key, value) in rows {
                last = Some(key.clone());
                if visit(key, value)? == ScanControl::Stop {
                    return Ok(());
                }
            }

            match last {
                Some(mut key) if !exhausted => {
                    key.push(0);
                    cursor = key;
                }
                _ => return Ok(()),
            }
        }
    }

    fn count_documents(&self) -> Result<usize, InternalError> {
        let (start, end) = self.layout.documents_range();
        let mut count = 0;
        self.scan_raw(start, &end, &mut |_, _| {
            count += 1;
            Ok(ScanControl::Continue)
        })?;

        Ok(count)
    }
}

impl<B: KvBackend> IndexSource for KvReader<'_, B> {
    fn point_lookup(
        &self,
        index: &IndexDefinition,
        key: &IndexableString,
    ) -> Result<Option<String>, InternalError> {
        self.backend
            .get(&self.layout.index_key(index.name(), key))?
            .map(Self::decode_id)
            .transpose()
    }

    fn scan_index(
        &self,
        index: &IndexDefinition,
        start: &IndexableString,
        end: Option<&IndexableString>,
        visit: &mut dyn FnMut(&str) -> Result<ScanControl, InternalError>,
    ) -> Result<(), InternalError> {
        let start = self.layout.index_key(index.name(), start);
        let end = end.map_or_else(
            || self.layout.index_end(index.name()),
            |end| self.layout.index_key(index.name(), end),
        );

        self.scan_raw(start, &end, &mut |_, value| {
            let id = Self::decode_id(value)?;
            visit(&id)
        })
    }

    fn document(&self, id: &str) -> Result<Option<Document>, InternalError> {
        self.backend
            .get(&self.layout.document_key(id))?
            .map(|bytes| deserialize_bounded::<Document>(&bytes, self.max_document_bytes))
            .transpose()
            .map_err(InternalError::from)
    }
}

///
/// KvStorageInstance
///

pub struct KvStorageInstance<B: KvBackend> {
    id: u64,
    key: CollectionKey,
    schema: Schema,
    indexes: IndexSet,
    layout: KeyLayout,
    shared: Arc<StorageShared<B>>,
    collection: Arc<CollectionState>,
    lifecycle: Lifecycle,
}

impl<B: KvBackend> KvStorageInstance<B> {
    pub(crate) fn new(
        id: u64,
        key: CollectionKey,
        schema: Schema,
        indexes: IndexSet,
        layout: KeyLayout,
        shared: Arc<StorageShared<B>>,
        collection: Arc<CollectionState>,
    ) -> Self {
        Self {
            id,
            key,
            schema,
            indexes,
            layout,
            shared,
            collection,
            lifecycle: Lifecycle::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    #[must_use]
    pub fn keyspace(&self) -> &str {
        self.layout.name()
    }

    #[must_use]
    pub const fn indexes(&self) -> &IndexSet {
        &self.indexes
    }

    fn reader(&self) -> KvReader<'_, B> {
        KvReader {
            backend: &self.shared.backend,
            layout: &self.layout,
            max_document_bytes: self.shared.settings.max_document_bytes,
        }
    }

    fn record(&self, event: MetricsEvent<'_>) {
        self.shared.metrics.record(event);
    }

    ///
    /// Generation protocol
    ///

    fn generation(&self) -> Result<u64, InternalError> {
        let Some(bytes) = self.shared.backend.get(&self.layout.generation_key())? else {
            return Ok(0);
        };
        let bytes: [u8; 8] = bytes.try_into().map_err(|_| {
            InternalError::store_corruption("write generation row is not eight bytes")
        })?;

        Ok(u64::from_be_bytes(bytes))
    }

    /// Apply `ops` bracketed by an odd and then even generation, so readers
    /// can tell a batch is in flight even on backends that publish one
    /// operation at a time.
    fn apply_generational(&self, ops: KvBatch) -> Result<(), InternalError> {
        let current = self.generation()?;
        let odd = if current % 2 == 0 {
            current + 1
        } else {
            current + 2
        };
        let key = self.layout.generation_key();

        let mut open = KvBatch::new();
        open.put(key.clone(), odd.to_be_bytes().to_vec());
        self.shared.backend.apply(open)?;

        self.shared.backend.apply(ops)?;

        let mut seal = KvBatch::new();
        seal.put(key, (odd + 1).to_be_bytes().to_vec());
        self.shared.backend.apply(seal)
    }

    /// Run `read` until it observes one stable, even generation. After
    /// `max_read_retries` torn attempts the read runs under the write queue.
    fn read_consistent<T>(
        &self,
        read: impl Fn(&KvReader<'_, B>) -> Result<T, InternalError>,
    ) -> Result<T, InternalError> {
        let reader = self.reader();

        for _ in 0..=self.shared.settings.max_read_retries {
            let before = self.generation()?;
            if before % 2 == 0 {
                let result = read(&reader);
                if self.generation()? == before {
                    return result;
                }
            }

            self.record(MetricsEvent::ReadRetry {
                collection: &self.key.collection,
            });
            std::thread::yield_now();
        }

        tracing::debug!(keyspace = self.layout.name(), "read fell back to the write queue");
        let _queue = self.collection.write_queue.lock();
        read(&reader)
    }

    ///
    /// Write path
    ///

    fn persist(
        &self,
        state: &mut HashMap<String, Document>,
        rows: &[BulkWriteRow],
        batch: &mut KvBatch,
        delta: &mut (u64, u64),
    ) -> Result<(), InternalError> {
        let primary_key = self.indexes.primary_key();
        let max_bytes = self.shared.settings.max_document_bytes;

        for row in rows {
            let id = row.document.require_primary_key(primary_key)?.to_string();
            let bytes = serialize_bounded(&row.document, max_bytes)?;
            batch.put(self.layout.document_key(&id), bytes);

            let stored = state.get(&id);
            for index in self.indexes.iter() {
                let next = index.indexable_string(&row.document);
                if let Some(stored) = stored {
                    let prev = index.indexable_string(stored);
                    if prev == next {
                        continue;
                    }
                    batch.delete(self.layout.index_key(index.name(), &prev));
                    delta.1 += 1;
                }
                batch.put(
                    self.layout.index_key(index.name(), &next),
                    id.as_bytes().to_vec(),
                );
                delta.0 += 1;
            }

            state.insert(id, row.document.clone());
        }

        Ok(())
    }

    fn purge(&self, docs: &[(String, Document)]) -> Result<(), InternalError> {
        let mut batch = KvBatch::new();
        let mut removes = 0_u64;
        for (id, doc) in docs {
            batch.delete(self.layout.document_key(id));
            for index in self.indexes.iter() {
                batch.delete(self.layout.index_key(index.name(), &index.indexable_string(doc)));
                removes += 1;
            }
        }
        self.apply_generational(batch)?;

        self.record(MetricsEvent::IndexDelta {
            collection: &self.key.collection,
            inserts: 0,
            removes,
        });

        Ok(())
    }

    /// Drain the write queue, then settle as closed. `clear` runs while the
    /// queue is held.
    fn shutdown(
        &self,
        clear: impl FnOnce() -> Result<(), InternalError>,
    ) -> Result<(), InternalError> {
        let cleared = {
            let _queue = self.collection.write_queue.lock();
            clear()
        };

        self.collection.hub.complete_owner(self.id);
        self.lifecycle.finish_close();
        self.shared.release(&self.key);
        tracing::debug!(keyspace = self.layout.name(), instance = self.id, "storage instance closed");

        cleared
    }
}

impl<B: KvBackend> StorageInstance for KvStorageInstance<B> {
    fn database_name(&self) -> &str {
        &self.key.database
    }

    fn collection_name(&self) -> &str {
        &self.key.collection
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn bulk_write(
        &self,
        rows: Vec<BulkWriteRow>,
        context: &str,
    ) -> Result<BulkWriteResponse, InternalError> {
        self.lifecycle.ensure_open("bulk_write")?;
        if rows.is_empty() {
            return Ok(BulkWriteResponse::default());
        }

        let mut writer = self.collection.write_queue.lock();
        // close may have started while this call waited for the queue
        self.lifecycle.ensure_open("bulk_write")?;

        // Phase 1: snapshot current state of every touched id.
        let primary_key = self.indexes.primary_key();
        let reader = self.reader();
        let mut docs_in_db = HashMap::new();
        for row in &rows {
            let id = row.document.require_primary_key(primary_key)?;
            if !self.indexes.primary_key_fits(id) {
                return Err(InternalError::write_invariant(format!(
                    "primary key '{id}' does not fit {} characters of '{primary_key}'",
                    self.indexes.primary_key_length()
                )));
            }
            if !docs_in_db.contains_key(id)
                && let Some(doc) = reader.document(id)?
            {
                docs_in_db.insert(id.to_string(), doc);
            }
        }

        // Phase 2: classify.
        let categorized = categorize_bulk_write_rows(primary_key, &docs_in_db, rows, context)?;

        // Phase 3: persist documents and index rows as one generation.
        let mut state = docs_in_db;
        let mut batch = KvBatch::new();
        let mut delta = (0_u64, 0_u64);
        self.persist(&mut state, &categorized.bulk_insert_docs, &mut batch, &mut delta)?;
        self.persist(&mut state, &categorized.bulk_update_docs, &mut batch, &mut delta)?;
        if !batch.is_empty() {
            self.apply_generational(batch)?;
        }

        // Phase 4: checkpoint and announce.
        let mut event_bulk = categorized.event_bulk;
        let stale = match (&event_bulk.checkpoint, &writer.last_checkpoint) {
            (Some(next), Some(last)) if next.lwt < last.lwt => Some(last.clone()),
            _ => None,
        };
        if let Some(last) = stale {
            tracing::warn!(
                keyspace = self.layout.name(),
                last = last.lwt,
                "batch is older than the last checkpoint; keeping the previous one"
            );
            event_bulk.checkpoint = Some(last);
        }
        if let Some(checkpoint) = &event_bulk.checkpoint {
            writer.last_checkpoint = Some(checkpoint.clone());
        }
        if !event_bulk.events.is_empty() {
            self.collection.hub.publish(&event_bulk);
        }
        drop(writer);

        let inserts = categorized.bulk_insert_docs.len() as u64;
        let updates = categorized.bulk_update_docs.len() as u64;
        let conflicts = categorized.errors.len() as u64;
        self.record(MetricsEvent::BulkWrite {
            collection: &self.key.collection,
            inserts,
            updates,
            conflicts,
        });
        self.record(MetricsEvent::IndexDelta {
            collection: &self.key.collection,
            inserts: delta.0,
            removes: delta.1,
        });
        tracing::debug!(
            keyspace = self.layout.name(),
            inserts,
            updates,
            conflicts,
            "bulk write applied"
        );

        let success = categorized
            .bulk_insert_docs
            .into_iter()
            .chain(categorized.bulk_update_docs)
            .map(|row| row.document)
            .collect();

        Ok(BulkWriteResponse {
            success,
            error: categorized.errors,
        })
    }

    fn find_documents_by_id(
        &self,
        ids: &[&str],
        with_deleted: bool,
    ) -> Result<Vec<Document>, InternalError> {
        self.lifecycle.ensure_open("find_documents_by_id")?;

        self.read_consistent(|reader| {
            let mut found = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(doc) = reader.document(id)?
                    && (with_deleted || !doc.is_deleted())
                {
                    found.push(doc);
                }
            }
            Ok(found)
        })
    }

    fn query(&self, prepared: &PreparedQuery) -> Result<QueryResult, InternalError> {
        self.lifecycle.ensure_open("query")?;

        let result = self.read_consistent(|reader| execute_query(&self.indexes, reader, prepared))?;
        self.record(MetricsEvent::Scan {
            collection: &self.key.collection,
            kind: result.scan,
            rows_scanned: result.rows_scanned,
        });

        Ok(result)
    }

    fn count(&self, prepared: &PreparedQuery) -> Result<usize, InternalError> {
        self.lifecycle.ensure_open("count")?;

        self.query(prepared).map(|result| result.documents.len())
    }

    fn changed_documents_since(
        &self,
        limit: usize,
        checkpoint: Option<&Checkpoint>,
    ) -> Result<ChangedDocuments, InternalError> {
        self.lifecycle.ensure_open("changed_documents_since")?;
        if limit == 0 {
            return Ok(ChangedDocuments {
                documents: Vec::new(),
                checkpoint: checkpoint.cloned(),
            });
        }

        let index = self.indexes.changes();
        let lower = match checkpoint {
            Some(cp) => vec![IndexBound::value(cp.lwt), IndexBound::value(cp.id.as_str())],
            None => vec![IndexBound::Min, IndexBound::Min],
        };
        let scan = IndexScan::from_bounds(
            index.lower_bound_string(&lower),
            index.upper_bound_string(&[IndexBound::Max, IndexBound::Max]),
            checkpoint.is_none(),
            true,
        );

        let documents = self.read_consistent(|reader| {
            let mut documents = Vec::new();
            let IndexScan::Range { start, end } = &scan else {
                return Ok(documents);
            };
            reader.scan_index(index, start, end.as_ref(), &mut |id| {
                let doc = reader.document(id)?.ok_or_else(|| {
                    InternalError::store_invariant(format!(
                        "change index points at missing document '{id}'"
                    ))
                })?;
                documents.push(doc);

                Ok(if documents.len() >= limit {
                    ScanControl::Stop
                } else {
                    ScanControl::Continue
                })
            })?;
            Ok(documents)
        })?;

        let primary_key = self.indexes.primary_key();
        let checkpoint = documents
            .last()
            .and_then(|doc| {
                doc.primary_key(primary_key)
                    .map(|id| Checkpoint::new(id, doc.lwt()))
            })
            .or_else(|| checkpoint.cloned());

        Ok(ChangedDocuments {
            documents,
            checkpoint,
        })
    }

    fn change_stream(&self) -> Result<ChangeStream, InternalError> {
        self.lifecycle.ensure_open("change_stream")?;

        Ok(self.collection.hub.subscribe(self.id))
    }

    fn change_stream_from(&self, checkpoint: &Checkpoint) -> Result<ChangeStream, InternalError> {
        self.lifecycle.ensure_open("change_stream_from")?;

        self.collection.hub.subscribe_from(self.id, checkpoint)
    }

    fn cleanup(&self, minimum_deleted_time: f64) -> Result<bool, InternalError> {
        self.lifecycle.ensure_open("cleanup")?;

        let _writer = self.collection.write_queue.lock();
        self.lifecycle.ensure_open("cleanup")?;

        let horizon = self.shared.clock.now() - minimum_deleted_time;
        let batch_size = self.shared.settings.cleanup_batch_size;
        let index = self.indexes.cleanup();
        let scan = IndexScan::from_bounds(
            index.lower_bound_string(&[IndexBound::value(true), IndexBound::Min, IndexBound::Min]),
            index.upper_bound_string(&[
                IndexBound::value(true),
                IndexBound::value(horizon),
                IndexBound::Min,
            ]),
            true,
            false,
        );
        let IndexScan::Range { start, end } = scan else {
            return Ok(true);
        };

        // one extra candidate tells whether another pass is needed
        let reader = self.reader();
        let mut candidates = Vec::new();
        reader.scan_index(index, &start, end.as_ref(), &mut |id| {
            if let Some(doc) = reader.document(id)?
                && doc.is_deleted()
                && doc.lwt() < horizon
            {
                candidates.push((id.to_string(), doc));
            }

            Ok(if candidates.len() > batch_size {
                ScanControl::Stop
            } else {
                ScanControl::Continue
            })
        })?;

        let done = candidates.len() <= batch_size;
        candidates.truncate(batch_size);
        if !candidates.is_empty() {
            self.purge(&candidates)?;
        }

        let purged = candidates.len() as u64;
        self.record(MetricsEvent::Purged {
            collection: &self.key.collection,
            documents: purged,
        });
        tracing::debug!(keyspace = self.layout.name(), purged, done, "cleanup pass");

        Ok(done)
    }

    fn attachment_data(
        &self,
        document_id: &str,
        attachment_id: &str,
        _digest: &str,
    ) -> Result<Vec<u8>, InternalError> {
        self.lifecycle.ensure_open("attachment_data")?;

        Err(InternalError::storage_unsupported(format!(
            "attachment '{attachment_id}' of document '{document_id}': attachments are not stored"
        )))
    }

    fn info(&self) -> Result<StorageInfo, InternalError> {
        self.lifecycle.ensure_open("info")?;

        let total_count = self.read_consistent(|reader| reader.count_documents())?;

        Ok(StorageInfo { total_count })
    }

    fn close(&self) -> Result<(), InternalError> {
        if !self.lifecycle.begin_close() {
            return Ok(());
        }

        self.shutdown(|| Ok(()))
    }

    fn remove(&self) -> Result<(), InternalError> {
        if !self.lifecycle.begin_close() {
            return Err(InternalError::closed("remove"));
        }

        self.shutdown(|| {
            let (start, end) = self.layout.keyspace_range();
            let reader = self.reader();
            let mut batch = KvBatch::new();
            reader.scan_raw(start, &end, &mut |key, _| {
                batch.delete(key);
                Ok(ScanControl::Continue)
            })?;
            let removed = batch.len();
            self.shared.backend.apply(batch)?;
            tracing::debug!(keyspace = self.layout.name(), removed, "collection removed");

            Ok(())
        })
    }
}

impl<B: KvBackend> Drop for KvStorageInstance<B> {
    fn drop(&mut self) {
        if self.lifecycle.begin_close() {
            let _ = self.shutdown(|| Ok(()));
        }
    }
}

impl<B: KvBackend> std::fmt::Debug for KvStorageInstance<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStorageInstance")
            .field("id", &self.id)
            .field("keyspace", &self.layout.name())
            .field("state", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}
