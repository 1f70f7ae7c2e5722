//! Module: query
//! Responsibility: query model, plan bounds, and index-driven execution.
//! Does not own: cost-based index selection; plans arrive prepared.
//! Boundary: storage instances hand a `PreparedQuery` plus an `IndexSource`
//! to the executor and receive matching documents back.

mod executor;
mod selector;
mod sort;

#[cfg(test)]
mod tests;

pub use executor::{IndexSource, QueryResult, ScanControl, execute_query};
pub use selector::{Condition, Selector, SelectorError};
pub use sort::{SortDirection, SortField, compare_documents, compare_values};

use crate::db::index::{INDEX_NAME_SEPARATOR, IndexBound};
use serde_json::Value;
use tidedb_schema::{DELETED_FIELD, path::FieldPath};

///
/// Query
///
/// Logical query: residual selector, requested order, and pagination.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub selector: Selector,
    pub sort: Vec<SortField>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl Query {
    #[must_use]
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            ..Self::default()
        }
    }

    /// Parse a Mango query object:
    /// `{ selector, sort: [{ field: "asc" | "desc" }], skip, limit }`.
    pub fn from_json(value: &Value) -> Result<Self, SelectorError> {
        let object = value.as_object().ok_or(SelectorError::ExpectedObject)?;

        let selector = match object.get("selector") {
            Some(selector) => Selector::parse(selector)?,
            None => Selector::All,
        };

        let mut sort = Vec::new();
        if let Some(entries) = object.get("sort") {
            let entries = entries
                .as_array()
                .ok_or_else(|| SelectorError::ExpectedArray("sort".to_string()))?;
            for entry in entries {
                let fields = entry.as_object().ok_or(SelectorError::ExpectedObject)?;
                for (field, direction) in fields {
                    let direction = match direction.as_str() {
                        Some("asc") => SortDirection::Asc,
                        Some("desc") => SortDirection::Desc,
                        _ => return Err(SelectorError::UnknownOperator(direction.to_string())),
                    };
                    sort.push(SortField {
                        path: FieldPath::parse(field)?,
                        direction,
                    });
                }
            }
        }

        let count = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|n| usize::try_from(n).ok())
        };

        Ok(Self {
            selector,
            sort,
            skip: count("skip").unwrap_or(0),
            limit: count("limit"),
        })
    }

    #[must_use]
    pub fn sort_by(mut self, field: SortField) -> Self {
        self.sort.push(field);
        self
    }

    #[must_use]
    pub const fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

///
/// QueryPlan
///
/// Chosen index and its bound tuples. `index` lists the index fields
/// without the leading `_deleted` slot; execution always scans live rows.
///

#[derive(Clone, Debug, PartialEq)]
pub struct QueryPlan {
    pub index: Vec<String>,
    pub start_keys: Vec<IndexBound>,
    pub end_keys: Vec<IndexBound>,
    pub inclusive_start: bool,
    pub inclusive_end: bool,
    pub selector_satisfied_by_index: bool,
    pub sort_satisfied_by_index: bool,
}

impl QueryPlan {
    /// Scan every live document in primary-key order.
    #[must_use]
    pub fn full_scan(primary_key: &FieldPath) -> Self {
        Self {
            index: vec![primary_key.to_string()],
            start_keys: vec![IndexBound::Min],
            end_keys: vec![IndexBound::Max],
            inclusive_start: true,
            inclusive_end: true,
            selector_satisfied_by_index: false,
            sort_satisfied_by_index: false,
        }
    }

    /// Range over a declared index. The primary key is appended to `fields`
    /// when absent, and bound tuples shorter than the index are filled so
    /// the range covers every row sharing the given prefix.
    #[must_use]
    pub fn field_range(
        fields: &[&str],
        primary_key: &FieldPath,
        start_keys: Vec<IndexBound>,
        end_keys: Vec<IndexBound>,
        inclusive_start: bool,
        inclusive_end: bool,
    ) -> Self {
        let mut index = fields.iter().map(ToString::to_string).collect::<Vec<_>>();
        if !index.iter().any(|field| field == primary_key.as_str()) {
            index.push(primary_key.to_string());
        }

        let start_fill = if inclusive_start {
            IndexBound::Min
        } else {
            IndexBound::Max
        };
        let end_fill = if inclusive_end {
            IndexBound::Max
        } else {
            IndexBound::Min
        };

        Self {
            start_keys: fill_bounds(start_keys, index.len(), &start_fill),
            end_keys: fill_bounds(end_keys, index.len(), &end_fill),
            index,
            inclusive_start,
            inclusive_end,
            selector_satisfied_by_index: false,
            sort_satisfied_by_index: false,
        }
    }

    #[must_use]
    pub const fn with_selector_satisfied(mut self, satisfied: bool) -> Self {
        self.selector_satisfied_by_index = satisfied;
        self
    }

    #[must_use]
    pub const fn with_sort_satisfied(mut self, satisfied: bool) -> Self {
        self.sort_satisfied_by_index = satisfied;
        self
    }

    /// Name of the stored index serving this plan.
    #[must_use]
    pub fn index_name(&self) -> String {
        std::iter::once(DELETED_FIELD)
            .chain(self.index.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(&INDEX_NAME_SEPARATOR.to_string())
    }
}

fn fill_bounds(mut keys: Vec<IndexBound>, len: usize, fill: &IndexBound) -> Vec<IndexBound> {
    keys.resize(len.max(keys.len()), fill.clone());
    keys
}

///
/// PreparedQuery
///

#[derive(Clone, Debug, PartialEq)]
pub struct PreparedQuery {
    pub query: Query,
    pub plan: QueryPlan,
}

impl PreparedQuery {
    #[must_use]
    pub const fn new(query: Query, plan: QueryPlan) -> Self {
        Self { query, plan }
    }
}
