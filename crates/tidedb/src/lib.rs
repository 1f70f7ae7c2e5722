//! ## Crate layout
//! - `core`: index encoding, write categorization, query execution, storage
//!   instances, config and observability.
//! - `schema`: collection schema model and validation.
//! - `db`: named database handle that opens collections.
//! - `error`: public error type with a stable kind + origin taxonomy.
//!
//! The `prelude` module mirrors the surface a collection layer needs to
//! open, write, query and follow a collection.

pub use tidedb_core as core;
pub use tidedb_schema as schema;

pub mod db;
pub mod error;

pub use db::Database;
pub use error::{Error, ErrorKind, ErrorOrigin};

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
///

pub mod prelude {
    pub use crate::{Database, Error, ErrorKind};
    pub use tidedb_core::{
        config::StorageSettings,
        db::{
            query::QueryResult,
            storage::{BulkWriteResponse, ChangeStream, ChangedDocuments, StreamEnd},
            write::stamp_write,
        },
        prelude::*,
    };
    pub use tidedb_schema::{Schema, path::FieldPath};
}
