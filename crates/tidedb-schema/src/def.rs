use crate::types::PropertyType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// SchemaDef
///
/// Wire form of a collection schema as supplied by the collection layer.
/// Unknown JSON-schema keywords are ignored.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDef {
    #[serde(default)]
    pub version: u32,

    pub primary_key: String,

    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDef>,

    #[serde(default)]
    pub indexes: Vec<IndexDef>,
}

///
/// PropertyDef
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDef {
    #[serde(rename = "type")]
    pub ty: PropertyType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiple_of: Option<f64>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Self>,
}

impl PropertyDef {
    #[must_use]
    pub const fn new(ty: PropertyType) -> Self {
        Self {
            ty,
            max_length: None,
            minimum: None,
            maximum: None,
            multiple_of: None,
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn string(max_length: usize) -> Self {
        let mut def = Self::new(PropertyType::String);
        def.max_length = Some(max_length);
        def
    }

    #[must_use]
    pub const fn number(minimum: f64, maximum: f64, multiple_of: f64) -> Self {
        let mut def = Self::new(PropertyType::Number);
        def.minimum = Some(minimum);
        def.maximum = Some(maximum);
        def.multiple_of = Some(multiple_of);
        def
    }

    #[must_use]
    pub const fn integer(minimum: f64, maximum: f64) -> Self {
        let mut def = Self::new(PropertyType::Integer);
        def.minimum = Some(minimum);
        def.maximum = Some(maximum);
        def
    }

    #[must_use]
    pub const fn boolean() -> Self {
        Self::new(PropertyType::Boolean)
    }
}

///
/// IndexDef
///
/// A declared index is either one field path or an ordered list of them.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IndexDef {
    Single(String),
    Compound(Vec<String>),
}

impl IndexDef {
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Self::Single(field) => vec![field.as_str()],
            Self::Compound(fields) => fields.iter().map(String::as_str).collect(),
        }
    }
}
