use crate::{document::Document, hash::framed_digest_hex};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error as ThisError;
use tidedb_schema::REV_FIELD;

const REVISION_DOMAIN: &[u8] = b"tidedb:revision:v1";
const REVISION_HASH_LEN: usize = 16;

///
/// RevisionError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum RevisionError {
    #[error("revision '{0}' is not of the form <height>-<hash>")]
    Malformed(String),

    #[error("revision '{0}' has a non-numeric height")]
    InvalidHeight(String),
}

///
/// Revision
///
/// Optimistic-concurrency token `"<height>-<hash>"`. Equality is exact;
/// the height is kept numeric so the write path can check that a new
/// revision is exactly one above the one it replaces.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Revision {
    height: u64,
    hash: String,
}

impl Revision {
    pub fn new(height: u64, hash: impl Into<String>) -> Self {
        Self {
            height,
            hash: hash.into(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, RevisionError> {
        let (height, hash) = raw
            .split_once('-')
            .ok_or_else(|| RevisionError::Malformed(raw.to_string()))?;
        if height.is_empty() || hash.is_empty() {
            return Err(RevisionError::Malformed(raw.to_string()));
        }

        let height = height
            .parse::<u64>()
            .map_err(|_| RevisionError::InvalidHeight(raw.to_string()))?;

        Ok(Self::new(height, hash))
    }

    #[must_use]
    pub const fn height(&self) -> u64 {
        self.height
    }

    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Derive the revision a writer stamps on `doc` when replacing `previous`.
    /// The hash covers the document body without its own revision field.
    #[must_use]
    pub fn next_for(previous: Option<&Self>, doc: &Document) -> Self {
        let height = previous.map_or(1, |rev| rev.height.saturating_add(1));

        let mut body = doc.clone();
        body.remove(REV_FIELD);
        let bytes = serde_json::to_vec(body.as_map()).unwrap_or_default();

        let height_bytes = height.to_be_bytes();
        let hash = framed_digest_hex(
            REVISION_DOMAIN,
            &[
                (b"height".as_slice(), height_bytes.as_slice()),
                (b"body".as_slice(), bytes.as_slice()),
            ],
            REVISION_HASH_LEN,
        );

        Self::new(height, hash)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.height, self.hash)
    }
}

impl FromStr for Revision {
    type Err = RevisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Revision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Revision {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;

        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_splits_height_and_hash() {
        let rev = Revision::parse("12-abc").unwrap();

        assert_eq!(rev.height(), 12);
        assert_eq!(rev.hash(), "abc");
        assert_eq!(rev.to_string(), "12-abc");
    }

    #[test]
    fn parse_rejects_malformed_tokens() {
        assert!(matches!(
            Revision::parse("abc"),
            Err(RevisionError::Malformed(_))
        ));
        assert!(matches!(
            Revision::parse("-abc"),
            Err(RevisionError::Malformed(_))
        ));
        assert!(matches!(
            Revision::parse("x-abc"),
            Err(RevisionError::InvalidHeight(_))
        ));
    }

    #[test]
    fn height_compares_numerically() {
        let low = Revision::parse("9-z").unwrap();
        let high = Revision::parse("10-a").unwrap();

        assert!(high.height() > low.height());
        assert!(high.to_string() < low.to_string());
    }

    #[test]
    fn next_for_increments_height_and_ignores_own_rev() {
        let doc = Document::try_from(json!({ "id": "a", "value": 1, "_rev": "1-old" })).unwrap();
        let same_body =
            Document::try_from(json!({ "id": "a", "value": 1, "_rev": "7-other" })).unwrap();

        let first = Revision::next_for(None, &doc);
        assert_eq!(first.height(), 1);

        let second = Revision::next_for(Some(&first), &doc);
        assert_eq!(second.height(), 2);

        assert_eq!(
            Revision::next_for(Some(&first), &same_body),
            second,
            "hash must not depend on the previous _rev value"
        );
    }
}
