use std::fmt;
use thiserror::Error as ThisError;
use tidedb_schema::validate::SchemaError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Per-document write conflicts are not errors at this level; they travel
/// as data inside the bulk-write response.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl InternalError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
        }
    }

    /// Construct an index-origin invariant violation.
    pub(crate) fn index_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Index, message)
    }

    /// Construct a query-origin invariant violation.
    pub(crate) fn query_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Query, message)
    }

    /// Construct a write-origin invariant violation.
    pub(crate) fn write_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Write, message)
    }

    /// Construct a store-origin invariant violation.
    pub(crate) fn store_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Store, message)
    }

    /// Construct a store-origin corruption error.
    pub(crate) fn store_corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Corruption, ErrorOrigin::Store, message)
    }

    /// Construct a storage-origin unsupported error.
    pub(crate) fn storage_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Storage, message)
    }

    /// Construct the error returned by every operation on a closed instance.
    pub(crate) fn closed(operation: &str) -> Self {
        Self::new(
            ErrorClass::Closed,
            ErrorOrigin::Storage,
            format!("storage instance is closed: {operation}"),
        )
    }

    /// Construct a config-origin unsupported error.
    pub(crate) fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Config, message)
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self.class, ErrorClass::Closed)
    }

    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(self.class, ErrorClass::InvariantViolation)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

impl From<SchemaError> for InternalError {
    fn from(err: SchemaError) -> Self {
        Self::index_invariant(err.to_string())
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
/// `InvariantViolation` is the should-not-happen class: fatal, never retried.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Conflict,
    Corruption,
    Closed,
    Internal,
    InvariantViolation,
    Unsupported,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Conflict => "conflict",
            Self::Corruption => "corruption",
            Self::Closed => "closed",
            Self::Internal => "internal",
            Self::InvariantViolation => "invariant_violation",
            Self::Unsupported => "unsupported",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Config,
    Index,
    Query,
    Serialize,
    Storage,
    Store,
    Write,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Config => "config",
            Self::Index => "index",
            Self::Query => "query",
            Self::Serialize => "serialize",
            Self::Storage => "storage",
            Self::Store => "store",
            Self::Write => "write",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///
