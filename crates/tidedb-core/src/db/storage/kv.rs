//! Module: storage::kv
//! Responsibility: the ordered key-value seam every backend implements.
//! Does not own: key layout, generation protocol or document encoding.
//! Boundary: `KvStorageInstance` talks to persistence only through `KvBackend`.

use crate::error::InternalError;
use parking_lot::RwLock;
use std::{collections::BTreeMap, ops::Bound};

///
/// KvOp
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KvOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

///
/// KvBatch
///
/// Ordered list of mutations. Whether a batch becomes visible at once or
/// one operation at a time is a property of the backend.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct KvBatch {
    ops: Vec<KvOp>,
}

impl KvBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(KvOp::Put { key, value });
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(KvOp::Delete { key });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KvOp> {
        self.ops.iter()
    }

    #[must_use]
    pub fn into_ops(self) -> Vec<KvOp> {
        self.ops
    }
}

///
/// KvBackend
///
/// Byte-ordered store. Implementations need not offer snapshot reads;
/// callers layer their own consistency protocol on top.
///

pub trait KvBackend: Send + Sync + 'static {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, InternalError>;

    /// Up to `limit` entries with `start <= key < end`, in key order.
    /// `end = None` scans to the end of the keyspace.
    fn scan(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, InternalError>;

    fn apply(&self, batch: KvBatch) -> Result<(), InternalError>;
}

///
/// ApplyMode
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ApplyMode {
    /// Whole batch under one lock.
    #[default]
    Atomic,

    /// One lock per operation; readers can observe half-applied batches.
    PerOperation,
}

///
/// MemoryKv
///

#[derive(Debug, Default)]
pub struct MemoryKv {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    mode: ApplyMode,
}

impl MemoryKv {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that publishes each operation of a batch separately,
    /// the way many embedded and browser stores behave.
    #[must_use]
    pub fn non_atomic() -> Self {
        Self {
            map: RwLock::new(BTreeMap::new()),
            mode: ApplyMode::PerOperation,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> ApplyMode {
        self.mode
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

fn apply_op(map: &mut BTreeMap<Vec<u8>, Vec<u8>>, op: KvOp) {
    match op {
        KvOp::Put { key, value } => {
            map.insert(key, value);
        }
        KvOp::Delete { key } => {
            map.remove(&key);
        }
    }
}

impl KvBackend for MemoryKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, InternalError> {
        Ok(self.map.read().get(key).cloned())
    }

    fn scan(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, InternalError> {
        if end.is_some_and(|end| start >= end) {
            return Ok(Vec::new());
        }
        let upper = end.map_or(Bound::Unbounded, Bound::Excluded);
        let map = self.map.read();

        Ok(map
            .range::<[u8], _>((Bound::Included(start), upper))
            .take(limit)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn apply(&self, batch: KvBatch) -> Result<(), InternalError> {
        match self.mode {
            ApplyMode::Atomic => {
                let mut map = self.map.write();
                for op in batch.into_ops() {
                    apply_op(&mut map, op);
                }
            }
            ApplyMode::PerOperation => {
                for op in batch.into_ops() {
                    apply_op(&mut self.map.write(), op);
                }
            }
        }

        Ok(())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(kv: &MemoryKv) {
        let mut batch = KvBatch::new();
        for key in [b"a".as_slice(), b"b", b"c", b"d"] {
            batch.put(key.to_vec(), key.to_vec());
        }
        kv.apply(batch).unwrap();
    }

    fn keys(entries: &[(Vec<u8>, Vec<u8>)]) -> Vec<&[u8]> {
        entries.iter().map(|(key, _)| key.as_slice()).collect()
    }

    #[test]
    fn scan_is_half_open_and_limited() {
        let kv = MemoryKv::new();
        seeded(&kv);

        let rows = kv.scan(b"b", Some(b"d"), 10).unwrap();
        assert_eq!(keys(&rows), vec![b"b".as_slice(), b"c"]);

        let rows = kv.scan(b"a", None, 3).unwrap();
        assert_eq!(keys(&rows), vec![b"a".as_slice(), b"b", b"c"]);
    }

    #[test]
    fn deletes_apply_in_order() {
        for kv in [MemoryKv::new(), MemoryKv::non_atomic()] {
            seeded(&kv);

            let mut batch = KvBatch::new();
            batch.delete(b"a".to_vec());
            batch.put(b"a".to_vec(), b"again".to_vec());
            batch.delete(b"b".to_vec());
            kv.apply(batch).unwrap();

            assert_eq!(kv.get(b"a").unwrap(), Some(b"again".to_vec()));
            assert_eq!(kv.get(b"b").unwrap(), None);
            assert_eq!(kv.len(), 3);
        }
    }
}
