//! Core runtime for TideDB: sortable index encoding, optimistic write
//! classification, range-scan query execution, and storage instances over
//! ordered key-value backends.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod clock;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod obs;
pub mod serialize;

pub(crate) mod hash;

///
/// Prelude
///
/// Vocabulary needed to open a collection, write to it and query it.
/// Backends, metrics sinks and codecs stay behind their modules.
///

pub mod prelude {
    pub use crate::{
        db::{
            index::IndexBound,
            query::{PreparedQuery, Query, QueryPlan, Selector, SortDirection, SortField},
            storage::{InstanceParams, MemoryStorage, StorageInstance},
            write::{BulkWriteRow, ChangeOperation, Checkpoint, EventBulk},
        },
        document::{Document, Revision},
    };
}
