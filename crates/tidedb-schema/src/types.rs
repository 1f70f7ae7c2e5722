use derive_more::Display;
use serde::{Deserialize, Serialize};

///
/// PropertyType
///
/// JSON-schema `type` keyword, restricted to the single-type form.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    #[display("string")]
    String,
    #[display("number")]
    Number,
    #[display("integer")]
    Integer,
    #[display("boolean")]
    Boolean,
    #[display("object")]
    Object,
    #[display("array")]
    Array,
}

///
/// NumberRange
///
/// Declared bounds of a numeric field. Index slots are only derivable when
/// both `minimum` and `maximum` are present.
///

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NumberRange {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub multiple_of: Option<f64>,
}

impl NumberRange {
    #[must_use]
    pub const fn new(minimum: f64, maximum: f64, multiple_of: Option<f64>) -> Self {
        Self {
            minimum: Some(minimum),
            maximum: Some(maximum),
            multiple_of,
        }
    }

    #[must_use]
    pub const fn is_bounded(&self) -> bool {
        self.minimum.is_some() && self.maximum.is_some()
    }

    /// Number of decimal digits implied by `multipleOf` (`0.01` -> 2).
    #[must_use]
    pub fn decimals(&self) -> usize {
        let Some(step) = self.multiple_of else {
            return 0;
        };

        let text = step.to_string();
        text.split_once('.').map_or(0, |(_, frac)| frac.len())
    }
}

///
/// FieldType
///
/// Resolved type of one (possibly nested) schema field.
///

#[derive(Clone, Debug, PartialEq)]
pub enum FieldType {
    String { max_length: Option<usize> },
    Number(NumberRange),
    Integer(NumberRange),
    Boolean,
    Object,
    Array,
}

impl FieldType {
    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        match self {
            Self::String { .. } => PropertyType::String,
            Self::Number(_) => PropertyType::Number,
            Self::Integer(_) => PropertyType::Integer,
            Self::Boolean => PropertyType::Boolean,
            Self::Object => PropertyType::Object,
            Self::Array => PropertyType::Array,
        }
    }

    /// Object and array fields cannot occupy a fixed-width index slot.
    #[must_use]
    pub const fn is_indexable(&self) -> bool {
        !matches!(self, Self::Object | Self::Array)
    }

    #[must_use]
    pub const fn number_range(&self) -> Option<&NumberRange> {
        match self {
            Self::Number(range) | Self::Integer(range) => Some(range),
            _ => None,
        }
    }
}

///
/// TESTS
///
