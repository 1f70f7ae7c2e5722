//! Module: storage::layout
//! Responsibility: byte layout of one collection's keyspace.
//! Does not own: value encoding (CBOR documents, UTF-8 primary keys).
//! Boundary: only `KvStorageInstance` builds backend keys.

use crate::error::InternalError;

const ROOT: &[u8] = b"tidedb";
const SEP: u8 = 0x00;
const SEP_END: u8 = 0x01;

const DOCUMENTS: u8 = b'd';
const INDEXES: u8 = b'i';
const GENERATION: u8 = b'g';

///
/// KeyLayout
///
/// `tidedb \0 <database> \0 <collection> \0 <version:u32be>` followed by
/// `\0 d \0 <id>` for documents, `\0 i \0 <index name> \0 <indexable>` for
/// index rows and `\0 g` for the write generation.
///
/// Names never contain NUL, so distinct collections never share a prefix.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct KeyLayout {
    prefix: Vec<u8>,
    name: String,
}

impl KeyLayout {
    pub(crate) fn new(
        database: &str,
        collection: &str,
        version: u32,
    ) -> Result<Self, InternalError> {
        for (label, name) in [("database", database), ("collection", collection)] {
            if name.is_empty() || name.contains('\0') {
                return Err(InternalError::storage_unsupported(format!(
                    "{label} name must be non-empty and free of NUL characters"
                )));
            }
        }

        let mut prefix = Vec::with_capacity(ROOT.len() + database.len() + collection.len() + 7);
        prefix.extend_from_slice(ROOT);
        prefix.push(SEP);
        prefix.extend_from_slice(database.as_bytes());
        prefix.push(SEP);
        prefix.extend_from_slice(collection.as_bytes());
        prefix.push(SEP);
        prefix.extend_from_slice(&version.to_be_bytes());

        Ok(Self {
            prefix,
            name: format!("tidedb|{database}|{collection}|{version}"),
        })
    }

    /// Human-readable keyspace name, used in logs and metrics.
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    fn section(&self, tag: u8) -> Vec<u8> {
        let mut key = self.prefix.clone();
        key.extend_from_slice(&[SEP, tag, SEP]);
        key
    }

    pub(crate) fn document_key(&self, id: &str) -> Vec<u8> {
        let mut key = self.section(DOCUMENTS);
        key.extend_from_slice(id.as_bytes());
        key
    }

    pub(crate) fn documents_range(&self) -> (Vec<u8>, Vec<u8>) {
        let start = self.section(DOCUMENTS);
        let mut end = start.clone();
        if let Some(last) = end.last_mut() {
            *last = SEP_END;
        }
        (start, end)
    }

    fn index_prefix(&self, index: &str) -> Vec<u8> {
        let mut key = self.section(INDEXES);
        key.extend_from_slice(index.as_bytes());
        key.push(SEP);
        key
    }

    pub(crate) fn index_key(&self, index: &str, indexable: &str) -> Vec<u8> {
        let mut key = self.index_prefix(index);
        key.extend_from_slice(indexable.as_bytes());
        key
    }

    /// Exclusive end of one index's rows.
    pub(crate) fn index_end(&self, index: &str) -> Vec<u8> {
        let mut key = self.index_prefix(index);
        if let Some(last) = key.last_mut() {
            *last = SEP_END;
        }
        key
    }

    pub(crate) fn generation_key(&self) -> Vec<u8> {
        let mut key = self.prefix.clone();
        key.extend_from_slice(&[SEP, GENERATION]);
        key
    }

    /// Every key of this collection.
    pub(crate) fn keyspace_range(&self) -> (Vec<u8>, Vec<u8>) {
        let mut start = self.prefix.clone();
        start.push(SEP);
        let mut end = self.prefix.clone();
        end.push(SEP_END);
        (start, end)
    }
}

///
/// TESTS
///
