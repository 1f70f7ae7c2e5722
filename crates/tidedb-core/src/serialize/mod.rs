mod cbor;

use crate::error::{ErrorClass, ErrorOrigin, InternalError};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error as ThisError;

/// CBOR persistence format for document rows.
///
/// Format-level only: size limits are passed in by the storage layer,
/// which owns the policy (`StorageSettings::max_document_bytes`).

///
/// SerializeError
///

#[derive(Debug, ThisError)]
pub enum SerializeError {
    #[error("serialize error: {0}")]
    Serialize(String),

    #[error("deserialize error: {0}")]
    Deserialize(String),

    #[error("size limit exceeded: {len} bytes (limit {max_bytes})")]
    SizeLimitExceeded { len: usize, max_bytes: usize },
}

impl From<SerializeError> for InternalError {
    fn from(err: SerializeError) -> Self {
        let class = match err {
            SerializeError::Serialize(_) | SerializeError::SizeLimitExceeded { .. } => {
                ErrorClass::Internal
            }
            SerializeError::Deserialize(_) => ErrorClass::Corruption,
        };

        Self::new(class, ErrorOrigin::Serialize, err.to_string())
    }
}

/// Serialize a value, rejecting payloads above `max_bytes`.
pub fn serialize_bounded<T>(value: &T, max_bytes: usize) -> Result<Vec<u8>, SerializeError>
where
    T: Serialize,
{
    let bytes = cbor::serialize(value)?;
    if bytes.len() > max_bytes {
        return Err(SerializeError::SizeLimitExceeded {
            len: bytes.len(),
            max_bytes,
        });
    }

    Ok(bytes)
}

/// Deserialize a value produced by [`serialize_bounded`], with an explicit size limit.
pub fn deserialize_bounded<T>(bytes: &[u8], max_bytes: usize) -> Result<T, SerializeError>
where
    T: DeserializeOwned,
{
    cbor::deserialize_bounded(bytes, max_bytes)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn documents_survive_the_row_format() {
        let doc = json!({ "id": "a", "value": 5, "_meta": { "lwt": 100.25 }, "_deleted": false });
        let bytes = serialize_bounded(&doc, 1024).unwrap();

        let back: Value = deserialize_bounded(&bytes, 1024).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn oversized_rows_are_rejected_both_ways() {
        let doc = json!({ "blob": "x".repeat(64) });

        assert!(matches!(
            serialize_bounded(&doc, 16),
            Err(SerializeError::SizeLimitExceeded { max_bytes: 16, .. })
        ));

        let bytes = serialize_bounded(&doc, 1024).unwrap();
        assert!(matches!(
            deserialize_bounded::<Value>(&bytes, 16),
            Err(SerializeError::SizeLimitExceeded { .. })
        ));
    }

    #[test]
    fn garbage_is_a_corruption_error() {
        let err = deserialize_bounded::<Value>(&[0xff, 0x00, 0x13], 1024).unwrap_err();
        let internal = InternalError::from(err);

        assert_eq!(internal.class, ErrorClass::Corruption);
    }
}
