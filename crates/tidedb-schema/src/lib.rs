//! Collection schema model for TideDB: field types and size constraints,
//! the primary key, and declared indexes.
//!
//! Index slot widths are derived from this model, so everything here is
//! validated up front and never reinterpreted after construction.

pub mod def;
pub mod path;
pub mod types;
pub mod validate;

use crate::{
    def::{IndexDef, PropertyDef, SchemaDef},
    path::FieldPath,
    types::{FieldType, NumberRange, PropertyType},
    validate::{SchemaError, validate_index_field, validate_primary_key},
};
use std::collections::BTreeMap;

///
/// CONSTANTS
///

/// Soft-delete tombstone flag.
pub const DELETED_FIELD: &str = "_deleted";

/// Revision token field (`"<height>-<hash>"`).
pub const REV_FIELD: &str = "_rev";

/// Container of engine-owned metadata.
pub const META_FIELD: &str = "_meta";

/// Last-write-time; dotted path into `_meta`.
pub const LWT_FIELD: &str = "_meta.lwt";

/// Smallest representable last-write-time.
pub const LWT_MINIMUM: f64 = 1.0;

/// Largest representable last-write-time.
pub const LWT_MAXIMUM: f64 = 1_000_000_000_000_000.0;

/// Resolution of last-write-time values.
pub const LWT_MULTIPLE_OF: f64 = 0.01;

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        Schema,
        def::{IndexDef, PropertyDef, SchemaDef},
        path::FieldPath,
        types::{FieldType, NumberRange, PropertyType},
        validate::SchemaError,
    };
}

///
/// Schema
///
/// Validated collection schema. Nested properties are flattened into a
/// dotted-path table so index builders resolve field types with one lookup.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    version: u32,
    primary_key: FieldPath,
    fields: BTreeMap<String, FieldType>,
    indexes: Vec<Vec<FieldPath>>,
}

impl Schema {
    /// Parse and validate a JSON schema document.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let def: SchemaDef =
            serde_json::from_str(json).map_err(|err| SchemaError::Parse(err.to_string()))?;

        Self::try_from_def(def)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, SchemaError> {
        let def: SchemaDef =
            serde_json::from_value(value).map_err(|err| SchemaError::Parse(err.to_string()))?;

        Self::try_from_def(def)
    }

    /// Validate a schema definition, injecting the internal fields when absent.
    pub fn try_from_def(mut def: SchemaDef) -> Result<Self, SchemaError> {
        inject_internal_fields(&mut def.properties)?;

        let mut fields = BTreeMap::new();
        flatten_properties("", &def.properties, &mut fields);

        let primary_key = FieldPath::parse(&def.primary_key)?;
        validate_primary_key(&fields, primary_key.as_str())?;

        let indexes = def
            .indexes
            .iter()
            .map(|index| parse_index(&fields, index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            version: def.version,
            primary_key,
            fields,
            indexes,
        })
    }

    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub const fn primary_key(&self) -> &FieldPath {
        &self.primary_key
    }

    /// Declared `maxLength` of the primary key.
    #[must_use]
    pub fn primary_key_length(&self) -> usize {
        match self.fields.get(self.primary_key.as_str()) {
            Some(FieldType::String {
                max_length: Some(len),
            }) => *len,
            _ => 0,
        }
    }

    /// Resolve a dotted path through nested properties.
    #[must_use]
    pub fn field_type(&self, path: &str) -> Option<&FieldType> {
        self.fields.get(path)
    }

    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, FieldType> {
        &self.fields
    }

    /// Declared indexes, without the internal prefix or primary-key suffix.
    #[must_use]
    pub fn indexes(&self) -> &[Vec<FieldPath>] {
        &self.indexes
    }

    /// Validate an arbitrary field list as an index over this schema.
    pub fn validate_index(&self, fields: &[FieldPath]) -> Result<(), SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::IndexEmpty);
        }

        fields
            .iter()
            .try_for_each(|field| validate_index_field(&self.fields, field.as_str()))
    }
}

fn parse_index(
    fields: &BTreeMap<String, FieldType>,
    index: &IndexDef,
) -> Result<Vec<FieldPath>, SchemaError> {
    let names = index.fields();
    if names.is_empty() {
        return Err(SchemaError::IndexEmpty);
    }

    names
        .into_iter()
        .map(|name| {
            let path = FieldPath::parse(name)?;
            validate_index_field(fields, path.as_str())?;

            Ok(path)
        })
        .collect()
}

fn inject_internal_fields(
    properties: &mut BTreeMap<String, PropertyDef>,
) -> Result<(), SchemaError> {
    expect_type(
        properties
            .entry(DELETED_FIELD.to_string())
            .or_insert_with(PropertyDef::boolean),
        DELETED_FIELD,
        PropertyType::Boolean,
    )?;

    expect_type(
        properties
            .entry(REV_FIELD.to_string())
            .or_insert_with(|| PropertyDef::new(PropertyType::String)),
        REV_FIELD,
        PropertyType::String,
    )?;

    let meta = properties
        .entry(META_FIELD.to_string())
        .or_insert_with(|| PropertyDef::new(PropertyType::Object));
    expect_type(meta, META_FIELD, PropertyType::Object)?;

    // lwt bounds are engine policy; a user declaration only fixes the type
    let lwt = meta
        .properties
        .entry("lwt".to_string())
        .or_insert_with(|| PropertyDef::number(LWT_MINIMUM, LWT_MAXIMUM, LWT_MULTIPLE_OF));
    expect_type(lwt, LWT_FIELD, PropertyType::Number)?;
    *lwt = PropertyDef::number(LWT_MINIMUM, LWT_MAXIMUM, LWT_MULTIPLE_OF);

    Ok(())
}

fn expect_type(
    def: &PropertyDef,
    field: &str,
    expected: PropertyType,
) -> Result<(), SchemaError> {
    if def.ty == expected {
        Ok(())
    } else {
        Err(SchemaError::InternalFieldType {
            field: field.to_string(),
            found: def.ty,
            expected,
        })
    }
}

fn flatten_properties(
    prefix: &str,
    properties: &BTreeMap<String, PropertyDef>,
    out: &mut BTreeMap<String, FieldType>,
) {
    for (name, def) in properties {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };

        let range = NumberRange {
            minimum: def.minimum,
            maximum: def.maximum,
            multiple_of: def.multiple_of,
        };
        let ty = match def.ty {
            PropertyType::String => FieldType::String {
                max_length: def.max_length,
            },
            PropertyType::Number => FieldType::Number(range),
            PropertyType::Integer => FieldType::Integer(range),
            PropertyType::Boolean => FieldType::Boolean,
            PropertyType::Object => FieldType::Object,
            PropertyType::Array => FieldType::Array,
        };

        if def.ty == PropertyType::Object {
            flatten_properties(&path, &def.properties, out);
        }
        out.insert(path, ty);
    }
}

///
/// TESTS
///
