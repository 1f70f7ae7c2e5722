//! Module: index::encode
//! Responsibility: document and bound-tuple encoding into indexable strings.
//! Does not own: exclusive-bound adjustment or scan classification.
//! Boundary: every index key written or searched is produced here.

use crate::{
    db::index::field::{FieldSlot, SlotKind},
    document::Document,
};
use derive_more::{Deref, Display};
use serde_json::Value;
use std::fmt::Write as _;
use tidedb_schema::{DELETED_FIELD, LWT_FIELD, Schema, path::FieldPath, validate::SchemaError};

/// Fill character of a string slot; also the encoding of a missing string.
pub const STRING_PAD: char = ' ';

/// Fill character of a string slot in a `Max` bound.
pub const STRING_MAX: char = char::MAX;

/// Separator used to derive an index name from its fields.
pub const INDEX_NAME_SEPARATOR: char = '|';

///
/// IndexableString
///
/// Fixed-width, order-preserving encoding of one index tuple. Lexicographic
/// order of two strings of the same index equals the order of their tuples.
///

#[derive(Clone, Debug, Deref, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct IndexableString(String);

impl IndexableString {
    #[must_use]
    pub const fn new(raw: String) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for IndexableString {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

///
/// IndexBound
///
/// One slot of a query-plan bound tuple. `Min` and `Max` sort below and
/// above every encodable value of the slot.
///

#[derive(Clone, Debug, PartialEq)]
pub enum IndexBound {
    Min,
    Max,
    Value(Value),
}

impl IndexBound {
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }
}

impl From<Value> for IndexBound {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

///
/// BoundSide
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum BoundSide {
    Lower,
    Upper,
}

///
/// IndexDefinition
///
/// Ordered list of field slots plus the derived name. Owns the pure
/// `document -> indexable string` function for one index.
///

#[derive(Clone, Debug, PartialEq)]
pub struct IndexDefinition {
    name: String,
    fields: Vec<FieldSlot>,
    width: usize,
}

impl IndexDefinition {
    /// Resolve every field against the schema; malformed or non-indexable
    /// fields fail here, never at encode time.
    pub fn new(schema: &Schema, fields: &[FieldPath]) -> Result<Self, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::IndexEmpty);
        }

        let fields = fields
            .iter()
            .map(|path| FieldSlot::from_schema(schema, path))
            .collect::<Result<Vec<_>, _>>()?;

        let name = fields
            .iter()
            .map(|slot| slot.path.as_str())
            .collect::<Vec<_>>()
            .join(&INDEX_NAME_SEPARATOR.to_string());
        let width = fields.iter().map(FieldSlot::width).sum();

        Ok(Self {
            name,
            fields,
            width,
        })
    }

    /// Parse raw dotted paths, then build the definition.
    pub fn from_paths(schema: &Schema, fields: &[&str]) -> Result<Self, SchemaError> {
        let paths = fields
            .iter()
            .map(|field| FieldPath::parse(field))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(schema, &paths)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldSlot] {
        &self.fields
    }

    #[must_use]
    pub fn field_paths(&self) -> Vec<&FieldPath> {
        self.fields.iter().map(|slot| &slot.path).collect()
    }

    /// Total width of an indexable string of this index, in characters.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Encode a document. Missing or mistyped values encode as the slot minimum.
    #[must_use]
    pub fn indexable_string(&self, doc: &Document) -> IndexableString {
        let mut out = String::with_capacity(self.width);
        for slot in &self.fields {
            encode_value(&slot.kind, doc.field(&slot.path), &mut out);
        }

        IndexableString(out)
    }

    /// Encode a lower bound tuple. `null`, mistyped and absent slots act as `Min`.
    #[must_use]
    pub fn lower_bound_string(&self, bounds: &[IndexBound]) -> IndexableString {
        self.bound_string(bounds, BoundSide::Lower)
    }

    /// Encode an upper bound tuple. `null`, mistyped and absent slots act as `Max`.
    #[must_use]
    pub fn upper_bound_string(&self, bounds: &[IndexBound]) -> IndexableString {
        self.bound_string(bounds, BoundSide::Upper)
    }

    fn bound_string(&self, bounds: &[IndexBound], side: BoundSide) -> IndexableString {
        let mut out = String::with_capacity(self.width);
        for (idx, slot) in self.fields.iter().enumerate() {
            encode_bound(&slot.kind, bounds.get(idx), side, &mut out);
        }

        IndexableString(out)
    }
}

///
/// IndexSet
///
/// Every index a collection maintains. Declared indexes are prefixed with
/// `_deleted` and suffixed with the primary key; the three built-ins serve
/// the primary ordering, the change feed and tombstone cleanup.
///

#[derive(Clone, Debug)]
pub struct IndexSet {
    primary_key: FieldPath,
    primary_key_length: usize,
    indexes: Vec<IndexDefinition>,
    primary: usize,
    changes: usize,
    cleanup: usize,
}

impl IndexSet {
    pub fn from_schema(schema: &Schema) -> Result<Self, SchemaError> {
        let pk = schema.primary_key().clone();
        let deleted = FieldPath::parse(DELETED_FIELD)?;
        let lwt = FieldPath::parse(LWT_FIELD)?;

        let mut indexes: Vec<IndexDefinition> = Vec::new();
        let mut push = |fields: Vec<FieldPath>| -> Result<usize, SchemaError> {
            let def = IndexDefinition::new(schema, &fields)?;
            if let Some(pos) = indexes.iter().position(|d| d.name == def.name) {
                return Ok(pos);
            }
            indexes.push(def);

            Ok(indexes.len() - 1)
        };

        let primary = push(vec![deleted.clone(), pk.clone()])?;
        let changes = push(vec![lwt.clone(), pk.clone()])?;
        let cleanup = push(vec![deleted.clone(), lwt, pk.clone()])?;

        for declared in schema.indexes() {
            let mut fields = Vec::with_capacity(declared.len() + 2);
            fields.push(deleted.clone());
            fields.extend(declared.iter().cloned());
            if !declared.contains(&pk) {
                fields.push(pk.clone());
            }
            push(fields)?;
        }

        Ok(Self {
            primary_key: pk,
            primary_key_length: schema.primary_key_length(),
            indexes,
            primary,
            changes,
            cleanup,
        })
    }

    #[must_use]
    pub const fn primary_key(&self) -> &FieldPath {
        &self.primary_key
    }

    #[must_use]
    pub const fn primary_key_length(&self) -> usize {
        self.primary_key_length
    }

    /// Whether `id` survives the trailing primary-key slot unchanged.
    /// Longer ids would be cut short and ids ending in the pad character
    /// would collide with their trimmed form.
    #[must_use]
    pub fn primary_key_fits(&self, id: &str) -> bool {
        id.chars().count() <= self.primary_key_length && !id.ends_with(STRING_PAD)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|def| def.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexDefinition> {
        self.indexes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// `[_deleted, pk]`
    #[must_use]
    pub fn primary(&self) -> &IndexDefinition {
        &self.indexes[self.primary]
    }

    /// `[_meta.lwt, pk]`
    #[must_use]
    pub fn changes(&self) -> &IndexDefinition {
        &self.indexes[self.changes]
    }

    /// `[_deleted, _meta.lwt, pk]`
    #[must_use]
    pub fn cleanup(&self) -> &IndexDefinition {
        &self.indexes[self.cleanup]
    }
}

///
/// Free-standing helpers
///

/// Total width of the indexable string for `fields` over `schema`.
pub fn indexable_string_length(
    schema: &Schema,
    fields: &[FieldPath],
) -> Result<usize, SchemaError> {
    IndexDefinition::new(schema, fields).map(|def| def.width())
}

/// Recover the primary key from the trailing slot of an indexable string.
/// Primary keys never end in the pad character, so trimming is lossless.
#[must_use]
pub fn primary_key_from_indexable_string(indexable: &str, primary_key_length: usize) -> String {
    let total = indexable.chars().count();
    let tail = indexable
        .chars()
        .skip(total.saturating_sub(primary_key_length));

    tail.collect::<String>()
        .trim_end_matches(STRING_PAD)
        .to_string()
}

/// Lower-bound string for a bound tuple over an ad-hoc field list.
pub fn start_string_from_lower_bound(
    schema: &Schema,
    fields: &[FieldPath],
    bounds: &[IndexBound],
) -> Result<IndexableString, SchemaError> {
    IndexDefinition::new(schema, fields).map(|def| def.lower_bound_string(bounds))
}

/// Upper-bound string for a bound tuple over an ad-hoc field list.
pub fn start_string_from_upper_bound(
    schema: &Schema,
    fields: &[FieldPath],
    bounds: &[IndexBound],
) -> Result<IndexableString, SchemaError> {
    IndexDefinition::new(schema, fields).map(|def| def.upper_bound_string(bounds))
}

///
/// Slot encoding
///

fn encode_value(kind: &SlotKind, value: Option<&Value>, out: &mut String) {
    match (kind, value) {
        (SlotKind::String { max_length }, Some(Value::String(text))) => {
            encode_string(text, *max_length, out);
        }
        (SlotKind::Boolean, Some(Value::Bool(flag))) => out.push(if *flag { '1' } else { '0' }),
        (SlotKind::Number { .. }, Some(Value::Number(number))) => match number.as_f64() {
            Some(number) if !number.is_nan() => encode_number(kind, number, out),
            _ => encode_min(kind, out),
        },
        _ => encode_min(kind, out),
    }
}

fn encode_bound(kind: &SlotKind, bound: Option<&IndexBound>, side: BoundSide, out: &mut String) {
    let open = |out: &mut String| match side {
        BoundSide::Lower => encode_min(kind, out),
        BoundSide::Upper => encode_max(kind, out),
    };

    match bound {
        Some(IndexBound::Min) => encode_min(kind, out),
        Some(IndexBound::Max) => encode_max(kind, out),
        Some(IndexBound::Value(value)) if value_fits(kind, value) => {
            encode_value(kind, Some(value), out);
        }
        Some(IndexBound::Value(_)) | None => open(out),
    }
}

fn value_fits(kind: &SlotKind, value: &Value) -> bool {
    match (kind, value) {
        (SlotKind::String { .. }, Value::String(_)) | (SlotKind::Boolean, Value::Bool(_)) => true,
        (SlotKind::Number { .. }, Value::Number(number)) => {
            number.as_f64().is_some_and(|n| !n.is_nan())
        }
        _ => false,
    }
}

fn encode_min(kind: &SlotKind, out: &mut String) {
    match kind {
        SlotKind::String { max_length } => pad(out, STRING_PAD, *max_length),
        SlotKind::Boolean => out.push('0'),
        SlotKind::Number { .. } => pad(out, '0', kind.width()),
    }
}

fn encode_max(kind: &SlotKind, out: &mut String) {
    match kind {
        SlotKind::String { max_length } => pad(out, STRING_MAX, *max_length),
        SlotKind::Boolean => out.push('1'),
        SlotKind::Number { .. } => pad(out, '9', kind.width()),
    }
}

fn encode_string(text: &str, max_length: usize, out: &mut String) {
    let mut written = 0;
    for ch in text.chars().take(max_length) {
        out.push(ch);
        written += 1;
    }
    pad(out, STRING_PAD, max_length - written);
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
fn encode_number(kind: &SlotKind, value: f64, out: &mut String) {
    let SlotKind::Number {
        minimum,
        maximum,
        non_decimals,
        decimals,
    } = *kind
    else {
        return;
    };

    let value = value.clamp(minimum, maximum);
    let whole = value.floor();
    let _ = write!(out, "{:0width$}", (whole - minimum) as u64, width = non_decimals);

    if decimals > 0 {
        let scale = 10f64.powi(decimals as i32);
        let ceiling = scale as u64 - 1;
        let fraction = (((value - whole) * scale).round() as u64).min(ceiling);
        let _ = write!(out, "{fraction:0decimals$}");
    }
}

fn pad(out: &mut String, ch: char, count: usize) {
    out.extend(std::iter::repeat_n(ch, count));
}
