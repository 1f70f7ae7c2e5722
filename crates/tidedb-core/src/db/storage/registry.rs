//! Module: storage::registry
//! Responsibility: own the backend and the per-collection shared state that
//! every instance of the same database/collection/version must agree on.
//! Does not own: per-instance lifecycle or read/write execution.
//! Boundary: `KvStorage::create_instance` is the only way to obtain an instance.

use crate::{
    clock::{Clock, SystemClock},
    config::StorageSettings,
    db::{
        index::IndexSet,
        storage::{
            instance::KvStorageInstance,
            kv::{KvBackend, MemoryKv},
            layout::KeyLayout,
            stream::ChangeHub,
        },
        write::Checkpoint,
    },
    error::InternalError,
    obs::{MetricsSink, NoopMetricsSink},
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tidedb_schema::Schema;

///
/// CollectionKey
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub(crate) struct CollectionKey {
    pub(crate) database: String,
    pub(crate) collection: String,
    pub(crate) version: u32,
}

///
/// WriterState
///
/// Guarded by the collection write queue; holding the lock is holding the
/// right to write.
///

#[derive(Debug, Default)]
pub(crate) struct WriterState {
    pub(crate) last_checkpoint: Option<Checkpoint>,
}

///
/// CollectionState
///

#[derive(Debug)]
pub(crate) struct CollectionState {
    pub(crate) write_queue: Mutex<WriterState>,
    pub(crate) hub: ChangeHub,
}

#[derive(Debug)]
struct Registered {
    state: Arc<CollectionState>,
    refs: usize,
}

///
/// StorageShared
///

pub(crate) struct StorageShared<B> {
    pub(crate) backend: B,
    pub(crate) settings: StorageSettings,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) metrics: Arc<dyn MetricsSink>,
    collections: Mutex<HashMap<CollectionKey, Registered>>,
    next_instance: AtomicU64,
}

impl<B> StorageShared<B> {
    fn acquire(&self, key: &CollectionKey) -> Arc<CollectionState> {
        let mut collections = self.collections.lock();
        let entry = collections.entry(key.clone()).or_insert_with(|| Registered {
            state: Arc::new(CollectionState {
                write_queue: Mutex::new(WriterState::default()),
                hub: ChangeHub::new(
                    self.settings.change_buffer_capacity,
                    self.settings.replay_capacity,
                ),
            }),
            refs: 0,
        });
        entry.refs += 1;

        Arc::clone(&entry.state)
    }

    /// Drop one reference; the last one completes the hub and forgets the state.
    pub(crate) fn release(&self, key: &CollectionKey) {
        let mut collections = self.collections.lock();
        let Some(entry) = collections.get_mut(key) else {
            return;
        };

        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0
            && let Some(entry) = collections.remove(key)
        {
            entry.state.hub.complete_all();
            tracing::debug!(
                database = %key.database,
                collection = %key.collection,
                version = key.version,
                "collection state released"
            );
        }
    }
}

///
/// InstanceParams
///

#[derive(Clone, Debug)]
pub struct InstanceParams {
    pub database_name: String,
    pub collection_name: String,
    pub schema: Schema,
}

impl InstanceParams {
    #[must_use]
    pub fn new(
        database_name: impl Into<String>,
        collection_name: impl Into<String>,
        schema: Schema,
    ) -> Self {
        Self {
            database_name: database_name.into(),
            collection_name: collection_name.into(),
            schema,
        }
    }
}

///
/// KvStorage
///
/// Storage over one key-value backend. Cheap to clone; clones share the
/// backend and the collection registry.
///

pub struct KvStorage<B> {
    shared: Arc<StorageShared<B>>,
}

/// Storage over the in-process ordered map.
pub type MemoryStorage = KvStorage<MemoryKv>;

impl<B> Clone for KvStorage<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: KvBackend> KvStorage<B> {
    /// Default settings, wall clock, no metrics.
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self::from_parts(
            backend,
            StorageSettings::default(),
            Arc::new(SystemClock::new()),
            Arc::new(NoopMetricsSink),
        )
    }

    #[must_use]
    pub fn builder(backend: B) -> KvStorageBuilder<B> {
        KvStorageBuilder {
            backend,
            settings: StorageSettings::default(),
            clock: None,
            metrics: None,
        }
    }

    fn from_parts(
        backend: B,
        settings: StorageSettings,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            shared: Arc::new(StorageShared {
                backend,
                settings,
                clock,
                metrics,
                collections: Mutex::new(HashMap::new()),
                next_instance: AtomicU64::new(1),
            }),
        }
    }

    /// Open an instance. Instances of the same database, collection and
    /// schema version share one write queue and one change hub.
    pub fn create_instance(
        &self,
        params: InstanceParams,
    ) -> Result<KvStorageInstance<B>, InternalError> {
        let InstanceParams {
            database_name,
            collection_name,
            schema,
        } = params;

        let layout = KeyLayout::new(&database_name, &collection_name, schema.version())?;
        let indexes = IndexSet::from_schema(&schema)?;
        let key = CollectionKey {
            database: database_name,
            collection: collection_name,
            version: schema.version(),
        };

        let state = self.shared.acquire(&key);
        let id = self.shared.next_instance.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(keyspace = layout.name(), instance = id, "storage instance created");

        Ok(KvStorageInstance::new(
            id,
            key,
            schema,
            indexes,
            layout,
            Arc::clone(&self.shared),
            state,
        ))
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.shared.backend
    }

    #[must_use]
    pub fn settings(&self) -> &StorageSettings {
        &self.shared.settings
    }

    /// Collections with at least one open instance.
    #[must_use]
    pub fn open_collections(&self) -> usize {
        self.shared.collections.lock().len()
    }
}

///
/// KvStorageBuilder
///

pub struct KvStorageBuilder<B> {
    backend: B,
    settings: StorageSettings,
    clock: Option<Arc<dyn Clock>>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl<B: KvBackend> KvStorageBuilder<B> {
    #[must_use]
    pub fn settings(mut self, settings: StorageSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<KvStorage<B>, InternalError> {
        self.settings.validate()?;

        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock::new()),
        };
        let metrics: Arc<dyn MetricsSink> = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(NoopMetricsSink),
        };

        Ok(KvStorage::from_parts(
            self.backend,
            self.settings,
            clock,
            metrics,
        ))
    }
}
