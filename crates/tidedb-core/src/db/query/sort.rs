//! Module: query::sort
//! Responsibility: total ordering over JSON values and sort specifications.
//! Does not own: index-satisfied ordering (the index encoding already sorts).
//! Boundary: used for residual sorting and selector comparisons.

use crate::document::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use tidedb_schema::path::FieldPath;

///
/// SortDirection
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

///
/// SortField
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SortField {
    pub path: FieldPath,
    pub direction: SortDirection,
}

impl SortField {
    #[must_use]
    pub const fn asc(path: FieldPath) -> Self {
        Self {
            path,
            direction: SortDirection::Asc,
        }
    }

    #[must_use]
    pub const fn desc(path: FieldPath) -> Self {
        Self {
            path,
            direction: SortDirection::Desc,
        }
    }
}

// missing < null < bool < number < string < array < object
const fn kind_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::String(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Object(_)) => 6,
    }
}

/// Total order over optional JSON values. Numbers compare numerically,
/// strings by code point, containers element-wise.
#[must_use]
pub fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.total_cmp(&b)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Array(a)), Some(Value::Array(b))) => a
            .iter()
            .zip(b)
            .map(|(x, y)| compare_values(Some(x), Some(y)))
            .find(|ord| ord.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (Some(Value::Object(a)), Some(Value::Object(b))) => {
            let mut a = a.iter().collect::<Vec<_>>();
            let mut b = b.iter().collect::<Vec<_>>();
            a.sort_by(|x, y| x.0.cmp(y.0));
            b.sort_by(|x, y| x.0.cmp(y.0));

            a.iter()
                .zip(&b)
                .map(|((ka, va), (kb, vb))| {
                    ka.cmp(kb).then_with(|| compare_values(Some(va), Some(vb)))
                })
                .find(|ord| ord.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len()))
        }
        _ => kind_rank(left).cmp(&kind_rank(right)),
    }
}

/// Compare two documents by `sort`, breaking ties on the primary key so
/// the order is deterministic.
#[must_use]
pub fn compare_documents(
    sort: &[SortField],
    primary_key: &FieldPath,
    left: &Document,
    right: &Document,
) -> Ordering {
    sort.iter()
        .map(|field| {
            let ord = compare_values(left.field(&field.path), right.field(&field.path));
            match field.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        })
        .find(|ord| ord.is_ne())
        .unwrap_or_else(|| {
            compare_values(left.field(primary_key), right.field(primary_key))
        })
}

///
/// TESTS
///
