//! Module: query::executor
//! Responsibility: turn a prepared plan into one index access and apply the
//! residual filter, sort and pagination.
//! Does not own: key layout or snapshot consistency; the source provides both.
//! Boundary: `execute_query` is the only entry point storage instances call.

use crate::{
    db::{
        index::{IndexBound, IndexDefinition, IndexScan, IndexSet, IndexableString},
        query::{PreparedQuery, sort::compare_documents},
    },
    document::Document,
    error::InternalError,
    obs::ScanKind,
};
use tidedb_schema::path::FieldPath;

///
/// ScanControl
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScanControl {
    Continue,
    Stop,
}

///
/// IndexSource
///
/// Read access to one collection's stored indexes and documents.
/// Index entries map an indexable string to a primary key.
///

pub trait IndexSource {
    fn point_lookup(
        &self,
        index: &IndexDefinition,
        key: &IndexableString,
    ) -> Result<Option<String>, InternalError>;

    /// Visit primary keys in index order over `[start, end)`; `None` is open.
    fn scan_index(
        &self,
        index: &IndexDefinition,
        start: &IndexableString,
        end: Option<&IndexableString>,
        visit: &mut dyn FnMut(&str) -> Result<ScanControl, InternalError>,
    ) -> Result<(), InternalError>;

    fn document(&self, id: &str) -> Result<Option<Document>, InternalError>;
}

///
/// QueryResult
///

#[derive(Clone, Debug, PartialEq)]
pub struct QueryResult {
    pub documents: Vec<Document>,
    pub scan: ScanKind,
    pub rows_scanned: u64,
}

impl QueryResult {
    const fn empty(scan: ScanKind) -> Self {
        Self {
            documents: Vec::new(),
            scan,
            rows_scanned: 0,
        }
    }
}

/// Execute `prepared` against `source`.
///
/// The scan stops early once `skip + limit` rows matched only when the plan
/// says the index order already is the requested order; otherwise every
/// row in range is collected, sorted, then sliced.
pub fn execute_query<S>(
    indexes: &IndexSet,
    source: &S,
    prepared: &PreparedQuery,
) -> Result<QueryResult, InternalError>
where
    S: IndexSource + ?Sized,
{
    let PreparedQuery { query, plan } = prepared;
    let skip = query.skip;
    let limit = query.limit.unwrap_or(usize::MAX);
    if limit == 0 {
        return Ok(QueryResult::empty(ScanKind::Empty));
    }
    let skip_plus_limit = skip.saturating_add(limit);

    let matcher = (!plan.selector_satisfied_by_index).then_some(&query.selector);

    let index_name = plan.index_name();
    let index = indexes.get(&index_name).ok_or_else(|| {
        InternalError::query_invariant(format!("query plan names unknown index '{index_name}'"))
    })?;

    // Phase 1: encode bounds.
    let lower = index.lower_bound_string(&live_bounds(&plan.start_keys));
    let upper = index.upper_bound_string(&live_bounds(&plan.end_keys));
    let scan = IndexScan::from_bounds(lower, upper, plan.inclusive_start, plan.inclusive_end);

    // Phase 2: access.
    let mut documents = Vec::new();
    let mut rows_scanned = 0_u64;
    let kind = match &scan {
        IndexScan::Empty => return Ok(QueryResult::empty(ScanKind::Empty)),
        IndexScan::Point(key) => {
            if let Some(id) = source.point_lookup(index, key)? {
                rows_scanned += 1;
                let doc = load_live(source, &id)?;
                if matcher.is_none_or(|m| m.matches(&doc)) {
                    documents.push(doc);
                }
            }
            ScanKind::Point
        }
        IndexScan::Range { start, end } => {
            let early_exit = plan.sort_satisfied_by_index;
            source.scan_index(index, start, end.as_ref(), &mut |id| {
                rows_scanned += 1;
                let doc = load_live(source, id)?;
                if matcher.is_none_or(|m| m.matches(&doc)) {
                    documents.push(doc);
                }

                Ok(if early_exit && documents.len() >= skip_plus_limit {
                    ScanControl::Stop
                } else {
                    ScanControl::Continue
                })
            })?;
            ScanKind::Range
        }
    };

    // Phase 3: residual sort and pagination.
    if !plan.sort_satisfied_by_index {
        let primary_key: &FieldPath = indexes.primary_key();
        documents.sort_by(|a, b| compare_documents(&query.sort, primary_key, a, b));
    }
    let documents = documents.into_iter().skip(skip).take(limit).collect();

    tracing::debug!(index = %index_name, rows_scanned, "query executed");

    Ok(QueryResult {
        documents,
        scan: kind,
        rows_scanned,
    })
}

fn load_live<S>(source: &S, id: &str) -> Result<Document, InternalError>
where
    S: IndexSource + ?Sized,
{
    match source.document(id)? {
        Some(doc) if !doc.is_deleted() => Ok(doc),
        Some(_) => Err(InternalError::query_invariant(format!(
            "live index entry points at deleted document '{id}'"
        ))),
        None => Err(InternalError::query_invariant(format!(
            "index entry points at missing document '{id}'"
        ))),
    }
}

// Executed plans only ever see live rows.
fn live_bounds(keys: &[IndexBound]) -> Vec<IndexBound> {
    let mut out = Vec::with_capacity(keys.len() + 1);
    out.push(IndexBound::value(false));
    out.extend_from_slice(keys);
    out
}
