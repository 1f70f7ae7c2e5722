use tidedb_schema::{
    Schema,
    path::FieldPath,
    types::{FieldType, NumberRange},
    validate::SchemaError,
};

///
/// SlotKind
///
/// Fixed-width encoding shape of one index field.
///

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SlotKind {
    /// Padded or truncated to `max_length` characters.
    String { max_length: usize },

    /// `'0'` or `'1'`.
    Boolean,

    /// `non_decimals` zero-padded integer digits counted from `minimum`,
    /// followed by `decimals` fraction digits.
    Number {
        minimum: f64,
        maximum: f64,
        non_decimals: usize,
        decimals: usize,
    },
}

impl SlotKind {
    /// Width of the slot in characters.
    #[must_use]
    pub const fn width(&self) -> usize {
        match self {
            Self::String { max_length } => *max_length,
            Self::Boolean => 1,
            Self::Number {
                non_decimals,
                decimals,
                ..
            } => *non_decimals + *decimals,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn number(range: &NumberRange) -> Option<Self> {
        let minimum = range.minimum?.floor();
        let maximum = range.maximum?.ceil();
        let span = (maximum - minimum).max(0.0) as u64;

        Some(Self::Number {
            minimum,
            maximum,
            non_decimals: span.to_string().len(),
            decimals: range.decimals(),
        })
    }
}

///
/// FieldSlot
///
/// One resolved index field: its path and slot encoding. Built once per
/// index definition so encoding never consults the schema again.
///

#[derive(Clone, Debug, PartialEq)]
pub struct FieldSlot {
    pub path: FieldPath,
    pub kind: SlotKind,
}

impl FieldSlot {
    pub fn from_schema(schema: &Schema, path: &FieldPath) -> Result<Self, SchemaError> {
        schema.validate_index(std::slice::from_ref(path))?;

        let ty = schema
            .field_type(path.as_str())
            .ok_or_else(|| SchemaError::IndexFieldMissing(path.to_string()))?;

        let kind = match ty {
            FieldType::String {
                max_length: Some(max_length),
            } => SlotKind::String {
                max_length: *max_length,
            },
            FieldType::Boolean => SlotKind::Boolean,
            FieldType::Number(range) | FieldType::Integer(range) => SlotKind::number(range)
                .ok_or_else(|| SchemaError::IndexNumberUnbounded(path.to_string()))?,
            FieldType::String { max_length: None } => {
                return Err(SchemaError::IndexStringUnbounded(path.to_string()));
            }
            FieldType::Object | FieldType::Array => {
                return Err(SchemaError::IndexFieldType {
                    field: path.to_string(),
                    found: ty.property_type(),
                });
            }
        };

        Ok(Self {
            path: path.clone(),
            kind,
        })
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.kind.width()
    }
}
