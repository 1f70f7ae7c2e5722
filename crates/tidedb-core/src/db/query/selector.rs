//! Module: query::selector
//! Responsibility: Mango-style selector parsing and in-memory matching.
//! Does not own: index selection or bound derivation (the planner's job).
//! Boundary: the executor applies a parsed selector as the residual filter.

use crate::{db::query::sort::compare_values, document::Document, error::InternalError};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use thiserror::Error as ThisError;
use tidedb_schema::path::{FieldPath, FieldPathError};

///
/// SelectorError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum SelectorError {
    #[error("selector must be a JSON object")]
    ExpectedObject,

    #[error("operator '{0}' expects an array")]
    ExpectedArray(String),

    #[error("operator '{0}' expects a boolean")]
    ExpectedBool(String),

    #[error("unsupported selector operator '{0}'")]
    UnknownOperator(String),

    #[error(transparent)]
    FieldPath(#[from] FieldPathError),
}

impl From<SelectorError> for InternalError {
    fn from(err: SelectorError) -> Self {
        Self::query_invariant(err.to_string())
    }
}

///
/// Condition
///

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
}

impl Condition {
    fn parse(op: &str, operand: &Value) -> Result<Self, SelectorError> {
        let list = || {
            operand
                .as_array()
                .cloned()
                .ok_or_else(|| SelectorError::ExpectedArray(op.to_string()))
        };

        Ok(match op {
            "$eq" => Self::Eq(operand.clone()),
            "$ne" => Self::Ne(operand.clone()),
            "$gt" => Self::Gt(operand.clone()),
            "$gte" => Self::Gte(operand.clone()),
            "$lt" => Self::Lt(operand.clone()),
            "$lte" => Self::Lte(operand.clone()),
            "$in" => Self::In(list()?),
            "$nin" => Self::Nin(list()?),
            "$exists" => Self::Exists(
                operand
                    .as_bool()
                    .ok_or_else(|| SelectorError::ExpectedBool(op.to_string()))?,
            ),
            other => return Err(SelectorError::UnknownOperator(other.to_string())),
        })
    }

    fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Self::Eq(expected) => value.is_some_and(|v| values_equal(v, expected)),
            Self::Ne(expected) => !value.is_some_and(|v| values_equal(v, expected)),
            Self::Gt(bound) => compare_same_kind(value, bound).is_some_and(Ordering::is_gt),
            Self::Gte(bound) => compare_same_kind(value, bound).is_some_and(Ordering::is_ge),
            Self::Lt(bound) => compare_same_kind(value, bound).is_some_and(Ordering::is_lt),
            Self::Lte(bound) => compare_same_kind(value, bound).is_some_and(Ordering::is_le),
            Self::In(options) => value.is_some_and(|v| options.iter().any(|o| values_equal(v, o))),
            Self::Nin(options) => {
                !value.is_some_and(|v| options.iter().any(|o| values_equal(v, o)))
            }
            Self::Exists(expected) => value.is_some() == *expected,
        }
    }
}

///
/// Selector
///
/// Parsed selector tree. Sibling keys of one object are implicitly and-ed.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Selector {
    All,
    And(Vec<Self>),
    Or(Vec<Self>),
    Nor(Vec<Self>),
    Field {
        path: FieldPath,
        conditions: Vec<Condition>,
    },
}

impl Selector {
    pub fn parse(value: &Value) -> Result<Self, SelectorError> {
        let object = value.as_object().ok_or(SelectorError::ExpectedObject)?;
        let mut clauses = object
            .iter()
            .map(|(key, operand)| parse_clause(key, operand))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(match clauses.len() {
            0 => Self::All,
            1 => clauses.remove(0),
            _ => Self::And(clauses),
        })
    }

    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::All => true,
            Self::And(children) => children.iter().all(|child| child.matches(doc)),
            Self::Or(children) => children.iter().any(|child| child.matches(doc)),
            Self::Nor(children) => !children.iter().any(|child| child.matches(doc)),
            Self::Field { path, conditions } => {
                let value = doc.field(path);
                conditions.iter().all(|condition| condition.matches(value))
            }
        }
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self::All
    }
}

fn parse_clause(key: &str, operand: &Value) -> Result<Selector, SelectorError> {
    if let Some(op) = key.strip_prefix('$') {
        let children = || -> Result<Vec<Selector>, SelectorError> {
            operand
                .as_array()
                .ok_or_else(|| SelectorError::ExpectedArray(key.to_string()))?
                .iter()
                .map(Selector::parse)
                .collect()
        };

        return match op {
            "and" => Ok(Selector::And(children()?)),
            "or" => Ok(Selector::Or(children()?)),
            "nor" => Ok(Selector::Nor(children()?)),
            _ => Err(SelectorError::UnknownOperator(key.to_string())),
        };
    }

    let path = FieldPath::parse(key)?;
    let conditions = match operand {
        Value::Object(ops) if is_operator_object(ops) => ops
            .iter()
            .map(|(op, arg)| Condition::parse(op, arg))
            .collect::<Result<Vec<_>, _>>()?,
        other => vec![Condition::Eq(other.clone())],
    };

    Ok(Selector::Field { path, conditions })
}

fn is_operator_object(ops: &Map<String, Value>) -> bool {
    !ops.is_empty() && ops.keys().all(|key| key.starts_with('$'))
}

fn values_equal(left: &Value, right: &Value) -> bool {
    compare_values(Some(left), Some(right)) == Ordering::Equal
}

// Range operators never match across JSON kinds.
fn compare_same_kind(value: Option<&Value>, bound: &Value) -> Option<Ordering> {
    let value = value?;
    let same = matches!(
        (value, bound),
        (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
            | (Value::Bool(_), Value::Bool(_))
    );

    same.then(|| compare_values(Some(value), Some(bound)))
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::try_from(value).unwrap()
    }

    fn matches(selector: Value, value: Value) -> bool {
        Selector::parse(&selector).unwrap().matches(&doc(value))
    }

    #[test]
    fn bare_values_are_equality() {
        assert!(matches(json!({ "a": 1 }), json!({ "a": 1.0 })));
        assert!(!matches(json!({ "a": 1 }), json!({ "a": 2 })));
        assert!(matches(json!({ "a.b": "x" }), json!({ "a": { "b": "x" } })));
    }

    #[test]
    fn comparison_operators_respect_kind() {
        let sel = json!({ "age": { "$gte": 18, "$lt": 65 } });

        assert!(matches(sel.clone(), json!({ "age": 18 })));
        assert!(!matches(sel.clone(), json!({ "age": 65 })));
        assert!(!matches(sel.clone(), json!({ "age": "30" })));
        assert!(!matches(sel, json!({})));
    }

    #[test]
    fn negative_operators_match_missing_fields() {
        assert!(matches(json!({ "a": { "$ne": 1 } }), json!({})));
        assert!(matches(json!({ "a": { "$nin": [1, 2] } }), json!({ "a": 3 })));
        assert!(!matches(json!({ "a": { "$nin": [1, 2] } }), json!({ "a": 2 })));
    }

    #[test]
    fn membership_and_existence() {
        assert!(matches(json!({ "a": { "$in": ["x", "y"] } }), json!({ "a": "y" })));
        assert!(matches(json!({ "a": { "$exists": false } }), json!({ "b": 1 })));
        assert!(matches(json!({ "a": { "$exists": true } }), json!({ "a": null })));
    }

    #[test]
    fn logical_operators_compose() {
        let sel = json!({
            "$or": [{ "a": 1 }, { "b": { "$gt": 5 } }],
            "$nor": [{ "c": true }]
        });

        assert!(matches(sel.clone(), json!({ "a": 1 })));
        assert!(matches(sel.clone(), json!({ "b": 6, "c": false })));
        assert!(!matches(sel.clone(), json!({ "a": 1, "c": true })));
        assert!(!matches(sel, json!({ "b": 5 })));
    }

    #[test]
    fn empty_selector_matches_everything() {
        assert_eq!(Selector::parse(&json!({})).unwrap(), Selector::All);
        assert!(matches(json!({}), json!({ "anything": 1 })));
    }

    #[test]
    fn malformed_selectors_are_rejected() {
        assert_eq!(
            Selector::parse(&json!({ "a": { "$regex": "x" } })),
            Err(SelectorError::UnknownOperator("$regex".to_string()))
        );
        assert_eq!(
            Selector::parse(&json!({ "$or": { "a": 1 } })),
            Err(SelectorError::ExpectedArray("$or".to_string()))
        );
        assert_eq!(
            Selector::parse(&json!([1])),
            Err(SelectorError::ExpectedObject)
        );
        assert!(matches!(
            Selector::parse(&json!({ "a..b": 1 })),
            Err(SelectorError::FieldPath(_))
        ));
    }
}
