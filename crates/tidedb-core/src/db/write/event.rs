use crate::{document::Document, hash::framed_digest_hex};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt};

const EVENT_DOMAIN: &[u8] = b"tidedb:event:v1";
const EVENT_ID_LEN: usize = 32;

///
/// ChangeOperation
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        };
        write!(f, "{label}")
    }
}

///
/// ChangeEvent
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub event_id: String,
    pub document_id: String,
    pub operation: ChangeOperation,
    pub document_data: Document,
    pub previous_document_data: Option<Document>,
}

impl ChangeEvent {
    /// Deterministic id from the bulk, the row position and the written revision.
    #[must_use]
    pub fn event_id(bulk_id: &str, row: usize, document_id: &str, document: &Document) -> String {
        let row = u64::try_from(row).unwrap_or(u64::MAX).to_be_bytes();
        let rev = document.rev().unwrap_or_default();

        framed_digest_hex(
            EVENT_DOMAIN,
            &[
                (b"bulk".as_slice(), bulk_id.as_bytes()),
                (b"row".as_slice(), row.as_slice()),
                (b"id".as_slice(), document_id.as_bytes()),
                (b"rev".as_slice(), rev.as_bytes()),
            ],
            EVENT_ID_LEN,
        )
    }
}

///
/// Checkpoint
///
/// Resumable cursor: the `(lwt, id)` of the last change observed. Ordered
/// the same way as the change index.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Checkpoint {
    pub id: String,
    pub lwt: f64,
}

impl Checkpoint {
    pub fn new(id: impl Into<String>, lwt: f64) -> Self {
        Self { id: id.into(), lwt }
    }

    #[must_use]
    pub fn cmp_position(&self, other: &Self) -> Ordering {
        self.lwt
            .total_cmp(&other.lwt)
            .then_with(|| self.id.cmp(&other.id))
    }
}

///
/// EventBulk
///
/// Every change produced by one successful write batch. Never mutated
/// once handed to the change stream.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct EventBulk {
    pub id: String,
    pub events: Vec<ChangeEvent>,
    pub checkpoint: Option<Checkpoint>,
    pub context: String,
}

impl EventBulk {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
