use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use tidedb_core::{
    config::ConfigError,
    error::{ErrorClass, ErrorOrigin as CoreErrorOrigin, InternalError},
};
use tidedb_schema::validate::SchemaError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self.kind, ErrorKind::Closed)
    }

    /// Whether retrying the same call could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Conflict)
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Self {
        let kind = match err.class {
            _ if err.origin == CoreErrorOrigin::Config => ErrorKind::Config,
            ErrorClass::Conflict => ErrorKind::Conflict,
            ErrorClass::Corruption => ErrorKind::Corruption,
            ErrorClass::Closed => ErrorKind::Closed,
            ErrorClass::InvariantViolation => ErrorKind::InvariantViolation,
            ErrorClass::Unsupported => ErrorKind::Unsupported,
            ErrorClass::Internal => ErrorKind::Internal,
        };

        Self::new(kind, err.origin.into(), err.message)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Self::new(ErrorKind::Schema, ErrorOrigin::Schema, err.to_string())
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::new(ErrorKind::Config, ErrorOrigin::Config, err.to_string())
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    /// Storage configuration was rejected.
    Config,

    /// Concurrent state changed underneath the call.
    Conflict,

    /// Persisted bytes could not be decoded.
    Corruption,

    /// The instance was closed or removed.
    Closed,

    /// Should not happen; never retried.
    InvariantViolation,

    /// The collection schema was rejected.
    Schema,

    /// The operation is not implemented by this storage.
    Unsupported,

    /// The caller cannot remediate this.
    Internal,
}

///
/// ErrorOrigin
/// Public origin taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    Config,
    Index,
    Query,
    Schema,
    Serialize,
    Storage,
    Store,
    Write,
}

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Config => Self::Config,
            CoreErrorOrigin::Index => Self::Index,
            CoreErrorOrigin::Query => Self::Query,
            CoreErrorOrigin::Serialize => Self::Serialize,
            CoreErrorOrigin::Storage => Self::Storage,
            CoreErrorOrigin::Store => Self::Store,
            CoreErrorOrigin::Write => Self::Write,
        }
    }
}

///
/// TESTS
///
