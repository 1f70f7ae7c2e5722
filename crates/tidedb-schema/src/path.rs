use derive_more::{AsRef, Display};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error as ThisError;

///
/// FieldPathError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum FieldPathError {
    #[error("field path is empty")]
    Empty,

    #[error("field path '{path}' contains an empty segment")]
    EmptySegment { path: String },
}

///
/// FieldPath
///
/// Dotted path into a document (`"_meta.lwt"`, `"address.city"`).
/// Segments are split once at parse time so lookups never re-scan the string.
///

#[derive(AsRef, Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("{raw}")]
pub struct FieldPath {
    #[as_ref(str)]
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self, FieldPathError> {
        if raw.is_empty() {
            return Err(FieldPathError::Empty);
        }

        let segments = raw.split('.').map(str::to_string).collect::<Vec<_>>();
        if segments.iter().any(String::is_empty) {
            return Err(FieldPathError::EmptySegment {
                path: raw.to_string(),
            });
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Resolve this path against a JSON value, walking nested objects.
    #[must_use]
    pub fn resolve<'a>(&self, root: &'a serde_json::Value) -> Option<&'a serde_json::Value> {
        self.segments
            .iter()
            .try_fold(root, |value, segment| value.as_object()?.get(segment))
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
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
    fn parse_splits_segments() {
        let path = FieldPath::parse("_meta.lwt").unwrap();

        assert_eq!(path.segments(), ["_meta", "lwt"]);
        assert_eq!(path.to_string(), "_meta.lwt");
    }

    #[test]
    fn parse_rejects_malformed_paths() {
        assert_eq!(FieldPath::parse(""), Err(FieldPathError::Empty));
        assert!(matches!(
            FieldPath::parse("a..b"),
            Err(FieldPathError::EmptySegment { .. })
        ));
        assert!(FieldPath::parse(".a").is_err());
        assert!(FieldPath::parse("a.").is_err());
    }

    #[test]
    fn resolve_walks_nested_objects() {
        let doc = json!({ "a": { "b": { "c": 3 } }, "x": 1 });

        let path = FieldPath::parse("a.b.c").unwrap();
        assert_eq!(path.resolve(&doc), Some(&json!(3)));

        let missing = FieldPath::parse("x.y").unwrap();
        assert_eq!(missing.resolve(&doc), None);
    }
}
