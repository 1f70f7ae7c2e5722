//! Storage engine: index encoding, write classification, query execution,
//! and the storage-instance contract that composes them over a backend.

pub mod index;
pub mod query;
pub mod storage;
pub mod write;
