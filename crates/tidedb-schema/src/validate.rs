use crate::{
    path::FieldPathError,
    types::{FieldType, PropertyType},
};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// SchemaError
///

#[derive(Clone, Debug, PartialEq, ThisError)]
pub enum SchemaError {
    #[error("schema is not valid json: {0}")]
    Parse(String),

    #[error(transparent)]
    FieldPath(#[from] FieldPathError),

    #[error("primary key '{0}' is not a top-level property")]
    PrimaryKeyMissing(String),

    #[error("primary key '{field}' must be a string, found {found}")]
    PrimaryKeyType { field: String, found: PropertyType },

    #[error("primary key '{0}' must declare maxLength")]
    PrimaryKeyLength(String),

    #[error("index field '{0}' is not in the schema")]
    IndexFieldMissing(String),

    #[error("index field '{field}' has non-indexable type {found}")]
    IndexFieldType { field: String, found: PropertyType },

    #[error("index field '{0}' must declare minimum and maximum")]
    IndexNumberUnbounded(String),

    #[error("index field '{0}' is a number and must declare multipleOf")]
    IndexNumberPrecision(String),

    #[error("index field '{field}' has an invalid range ({minimum}..{maximum})")]
    IndexNumberRange {
        field: String,
        minimum: f64,
        maximum: f64,
    },

    #[error("index field '{0}' must declare maxLength")]
    IndexStringUnbounded(String),

    #[error("index is empty")]
    IndexEmpty,

    #[error("internal field '{field}' is declared as {found}, expected {expected}")]
    InternalFieldType {
        field: String,
        found: PropertyType,
        expected: PropertyType,
    },
}

/// Check one index field against the flattened field table.
pub(crate) fn validate_index_field(
    fields: &BTreeMap<String, FieldType>,
    field: &str,
) -> Result<(), SchemaError> {
    let ty = fields
        .get(field)
        .ok_or_else(|| SchemaError::IndexFieldMissing(field.to_string()))?;

    match ty {
        FieldType::String { max_length: None } => {
            Err(SchemaError::IndexStringUnbounded(field.to_string()))
        }
        FieldType::Number(range) | FieldType::Integer(range) => match (range.minimum, range.maximum)
        {
            (Some(minimum), Some(maximum)) if minimum.is_finite() && maximum.is_finite() => {
                if minimum > maximum {
                    return Err(SchemaError::IndexNumberRange {
                        field: field.to_string(),
                        minimum,
                        maximum,
                    });
                }
                // fraction digits come from multipleOf; integers have none
                if matches!(ty, FieldType::Number(_))
                    && !range.multiple_of.is_some_and(|step| step.is_finite() && step > 0.0)
                {
                    return Err(SchemaError::IndexNumberPrecision(field.to_string()));
                }
                Ok(())
            }
            _ => Err(SchemaError::IndexNumberUnbounded(field.to_string())),
        },
        FieldType::Object | FieldType::Array => Err(SchemaError::IndexFieldType {
            field: field.to_string(),
            found: ty.property_type(),
        }),
        FieldType::String { .. } | FieldType::Boolean => Ok(()),
    }
}

/// Primary keys are bounded top-level strings.
pub(crate) fn validate_primary_key(
    fields: &BTreeMap<String, FieldType>,
    primary_key: &str,
) -> Result<(), SchemaError> {
    if primary_key.contains('.') {
        return Err(SchemaError::PrimaryKeyMissing(primary_key.to_string()));
    }

    match fields.get(primary_key) {
        None => Err(SchemaError::PrimaryKeyMissing(primary_key.to_string())),
        Some(FieldType::String { max_length: None }) => {
            Err(SchemaError::PrimaryKeyLength(primary_key.to_string()))
        }
        Some(FieldType::String { .. }) => Ok(()),
        Some(other) => Err(SchemaError::PrimaryKeyType {
            field: primary_key.to_string(),
            found: other.property_type(),
        }),
    }
}
