use crate::error::Error;
use std::sync::Arc;
use tidedb_core::{
    clock::Clock,
    config::StorageSettings,
    db::storage::{InstanceParams, KvBackend, KvStorage, KvStorageInstance, MemoryKv},
    obs::MetricsSink,
};
use tidedb_schema::Schema;

///
/// Database
/// Named handle over one storage. Opens collections by name and converts
/// core errors into `tidedb::Error`.
///

pub struct Database<B: KvBackend> {
    name: String,
    storage: KvStorage<B>,
}

impl Database<MemoryKv> {
    /// In-process database with default settings.
    #[must_use]
    pub fn memory(name: impl Into<String>) -> Self {
        Self::new(name, KvStorage::new(MemoryKv::new()))
    }

    /// In-process database configured from a TOML document.
    pub fn memory_from_toml(name: impl Into<String>, raw: &str) -> Result<Self, Error> {
        let settings = StorageSettings::from_toml_str(raw)?;
        let storage = KvStorage::builder(MemoryKv::new())
            .settings(settings)
            .build()?;

        Ok(Self::new(name, storage))
    }
}

impl<B: KvBackend> Database<B> {
    #[must_use]
    pub fn new(name: impl Into<String>, storage: KvStorage<B>) -> Self {
        Self {
            name: name.into(),
            storage,
        }
    }

    /// Database over `backend` with explicit settings, clock and metrics sink.
    pub fn with_parts(
        name: impl Into<String>,
        backend: B,
        settings: StorageSettings,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, Error> {
        let storage = KvStorage::builder(backend)
            .settings(settings)
            .clock(clock)
            .metrics(metrics)
            .build()?;

        Ok(Self::new(name, storage))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn storage(&self) -> &KvStorage<B> {
        &self.storage
    }

    /// Open a collection with an already validated schema.
    pub fn collection(
        &self,
        name: impl Into<String>,
        schema: Schema,
    ) -> Result<KvStorageInstance<B>, Error> {
        let name = name.into();
        let instance = self
            .storage
            .create_instance(InstanceParams::new(self.name.clone(), name.clone(), schema))?;
        tracing::debug!(database = %self.name, collection = %name, "collection opened");

        Ok(instance)
    }

    /// Open a collection from its JSON schema text.
    pub fn collection_from_json(
        &self,
        name: impl Into<String>,
        schema: &str,
    ) -> Result<KvStorageInstance<B>, Error> {
        let schema = Schema::from_json(schema)?;

        self.collection(name, schema)
    }
}

impl<B: KvBackend> Clone for Database<B> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            storage: self.storage.clone(),
        }
    }
}
