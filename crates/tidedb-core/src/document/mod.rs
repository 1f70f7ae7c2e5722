//! Module: document
//! Responsibility: JSON document wrapper and engine-owned field access.
//! Does not own: schema validation of user fields.
//! Boundary: every persisted row and every write-row payload is a `Document`.

mod revision;

pub use revision::{Revision, RevisionError};

use crate::error::InternalError;
use derive_more::Deref;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error as ThisError;
use tidedb_schema::{DELETED_FIELD, LWT_FIELD, REV_FIELD, path::FieldPath};

///
/// DocumentError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum DocumentError {
    #[error("document must be a JSON object")]
    NotAnObject,

    #[error("document has no string primary key '{0}'")]
    MissingPrimaryKey(String),
}

impl From<DocumentError> for InternalError {
    fn from(err: DocumentError) -> Self {
        Self::write_invariant(err.to_string())
    }
}

impl From<RevisionError> for InternalError {
    fn from(err: RevisionError) -> Self {
        Self::write_invariant(err.to_string())
    }
}

///
/// Document
///
/// JSON object with dotted-path access to the internal fields
/// (`_deleted`, `_rev`, `_meta.lwt`) and to indexed user fields.
///

#[derive(Clone, Debug, Default, Deref, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    #[must_use]
    pub const fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Resolve a parsed field path.
    #[must_use]
    pub fn field(&self, path: &FieldPath) -> Option<&Value> {
        let (first, rest) = path.segments().split_first()?;

        rest.iter()
            .try_fold(self.0.get(first)?, |value, segment| {
                value.as_object()?.get(segment)
            })
    }

    /// Resolve a raw dotted path.
    #[must_use]
    pub fn field_at(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = self.0.get(segments.next()?)?;

        segments.try_fold(first, |value, segment| value.as_object()?.get(segment))
    }

    /// Write a value at a dotted path, creating intermediate objects.
    /// A non-object value in the way is replaced.
    pub fn set_at(&mut self, path: &str, value: Value) {
        let mut segments = path.split('.').peekable();
        let mut current = &mut self.0;

        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                current.insert(segment.to_string(), value);
                return;
            }

            let slot = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Value::Object(next) = slot else {
                return;
            };
            current = next;
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Primary-key value; primary keys are always top-level strings.
    #[must_use]
    pub fn primary_key(&self, primary_key: &FieldPath) -> Option<&str> {
        self.field(primary_key).and_then(Value::as_str)
    }

    pub fn require_primary_key(&self, primary_key: &FieldPath) -> Result<&str, DocumentError> {
        self.primary_key(primary_key)
            .ok_or_else(|| DocumentError::MissingPrimaryKey(primary_key.to_string()))
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.0
            .get(DELETED_FIELD)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// `_meta.lwt`, or `0.0` when absent.
    #[must_use]
    pub fn lwt(&self) -> f64 {
        self.field_at(LWT_FIELD)
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    #[must_use]
    pub fn rev(&self) -> Option<&str> {
        self.0.get(REV_FIELD).and_then(Value::as_str)
    }

    pub fn revision(&self) -> Result<Option<Revision>, RevisionError> {
        self.rev().map(Revision::parse).transpose()
    }

    #[must_use]
    pub fn with_deleted(mut self, deleted: bool) -> Self {
        self.0.insert(DELETED_FIELD.to_string(), Value::Bool(deleted));
        self
    }

    #[must_use]
    pub fn with_lwt(mut self, lwt: f64) -> Self {
        self.set_at(LWT_FIELD, Value::from(lwt));
        self
    }

    #[must_use]
    pub fn with_revision(mut self, revision: &Revision) -> Self {
        self.0
            .insert(REV_FIELD.to_string(), Value::String(revision.to_string()));
        self
    }
}

impl TryFrom<Value> for Document {
    type Error = DocumentError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(DocumentError::NotAnObject),
        }
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}

///
/// TESTS
///
