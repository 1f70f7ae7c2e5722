use super::*;
use crate::{
    db::index::{IndexBound, IndexDefinition, IndexSet, IndexableString},
    document::Document,
    error::{ErrorClass, InternalError},
    obs::ScanKind,
};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use tidedb_schema::{Schema, path::FieldPath};

///
/// MapSource
///
/// Minimal in-memory index source: one ordered map of
/// `(index name, indexable string) -> primary key`.
///

struct MapSource {
    rows: BTreeMap<(String, IndexableString), String>,
    docs: HashMap<String, Document>,
}

impl MapSource {
    fn new(indexes: &IndexSet, docs: &[Value]) -> Self {
        let mut source = Self {
            rows: BTreeMap::new(),
            docs: HashMap::new(),
        };
        for value in docs {
            let doc = Document::try_from(value.clone()).unwrap();
            let id = doc.primary_key(indexes.primary_key()).unwrap().to_string();
            for index in indexes.iter() {
                source.rows.insert(
                    (index.name().to_string(), index.indexable_string(&doc)),
                    id.clone(),
                );
            }
            source.docs.insert(id, doc);
        }
        source
    }
}

impl IndexSource for MapSource {
    fn point_lookup(
        &self,
        index: &IndexDefinition,
        key: &IndexableString,
    ) -> Result<Option<String>, InternalError> {
        Ok(self
            .rows
            .get(&(index.name().to_string(), key.clone()))
            .cloned())
    }

    fn scan_index(
        &self,
        index: &IndexDefinition,
        start: &IndexableString,
        end: Option<&IndexableString>,
        visit: &mut dyn FnMut(&str) -> Result<ScanControl, InternalError>,
    ) -> Result<(), InternalError> {
        let from = (index.name().to_string(), start.clone());
        for ((name, key), id) in self.rows.range(from..) {
            if name != index.name() || end.is_some_and(|end| key >= end) {
                break;
            }
            if visit(id)? == ScanControl::Stop {
                break;
            }
        }
        Ok(())
    }

    fn document(&self, id: &str) -> Result<Option<Document>, InternalError> {
        Ok(self.docs.get(id).cloned())
    }
}

fn schema() -> Schema {
    Schema::from_json(
        r#"{
            "primaryKey": "id",
            "properties": {
                "id": { "type": "string", "maxLength": 10 },
                "value": { "type": "integer", "minimum": 0, "maximum": 100 },
                "tag": { "type": "string", "maxLength": 4 }
            },
            "indexes": ["value"]
        }"#,
    )
    .unwrap()
}

fn fixture(docs: &[Value]) -> (IndexSet, MapSource) {
    let indexes = IndexSet::from_schema(&schema()).unwrap();
    let source = MapSource::new(&indexes, docs);
    (indexes, source)
}

fn row(id: &str, value: i64, tag: &str) -> Value {
    json!({ "id": id, "value": value, "tag": tag, "_deleted": false, "_meta": { "lwt": 100.0 } })
}

fn pk() -> FieldPath {
    FieldPath::parse("id").unwrap()
}

fn ids(result: &QueryResult) -> Vec<&str> {
    result
        .documents
        .iter()
        .map(|doc| doc.primary_key(&pk()).unwrap())
        .collect()
}

fn value_range(lower: i64, upper: i64, inclusive_start: bool, inclusive_end: bool) -> QueryPlan {
    QueryPlan::field_range(
        &["value"],
        &pk(),
        vec![IndexBound::value(lower)],
        vec![IndexBound::value(upper)],
        inclusive_start,
        inclusive_end,
    )
}

#[test]
fn half_open_range_returns_documents_inside() {
    let (indexes, source) = fixture(&[row("a", 5, "x"), row("b", 10, "x"), row("c", 0, "x")]);
    let prepared = PreparedQuery::new(
        Query::default(),
        value_range(0, 10, true, false).with_sort_satisfied(true),
    );

    let result = execute_query(&indexes, &source, &prepared).unwrap();

    assert_eq!(ids(&result), vec!["c", "a"]);
    assert_eq!(result.scan, ScanKind::Range);
}

#[test]
fn exclusive_start_skips_the_lower_value() {
    let (indexes, source) = fixture(&[row("a", 5, "x"), row("b", 10, "x"), row("c", 0, "x")]);
    let prepared = PreparedQuery::new(
        Query::default(),
        value_range(0, 10, false, true).with_sort_satisfied(true),
    );

    let result = execute_query(&indexes, &source, &prepared).unwrap();

    assert_eq!(ids(&result), vec!["a", "b"]);
}

#[test]
fn field_range_fills_trailing_slots() {
    let plan = value_range(1, 2, true, false);
    assert_eq!(plan.index, vec!["value".to_string(), "id".to_string()]);
    assert_eq!(plan.start_keys[1], IndexBound::Min);
    assert_eq!(plan.end_keys[1], IndexBound::Min);

    let plan = value_range(1, 2, false, true);
    assert_eq!(plan.start_keys[1], IndexBound::Max);
    assert_eq!(plan.end_keys[1], IndexBound::Max);
    assert_eq!(plan.index_name(), "_deleted|value|id");
}

#[test]
fn equal_full_keys_use_a_point_lookup() {
    let (indexes, source) = fixture(&[row("a", 5, "x"), row("b", 5, "y")]);
    let plan = QueryPlan::field_range(
        &["value"],
        &pk(),
        vec![IndexBound::value(5), IndexBound::value("b")],
        vec![IndexBound::value(5), IndexBound::value("b")],
        true,
        true,
    );

    let result =
        execute_query(&indexes, &source, &PreparedQuery::new(Query::default(), plan)).unwrap();

    assert_eq!(result.scan, ScanKind::Point);
    assert_eq!(ids(&result), vec!["b"]);
}

#[test]
fn equal_keys_with_an_exclusive_side_are_empty() {
    let (indexes, source) = fixture(&[row("a", 5, "x")]);
    let plan = QueryPlan::field_range(
        &["value"],
        &pk(),
        vec![IndexBound::value(5), IndexBound::value("a")],
        vec![IndexBound::value(5), IndexBound::value("a")],
        true,
        false,
    );

    let result =
        execute_query(&indexes, &source, &PreparedQuery::new(Query::default(), plan)).unwrap();

    assert_eq!(result.scan, ScanKind::Empty);
    assert!(result.documents.is_empty());
}

#[test]
fn satisfied_sort_stops_after_skip_plus_limit() {
    let docs = (0..10)
        .map(|n| row(&format!("d{n}"), n, "x"))
        .collect::<Vec<_>>();
    let (indexes, source) = fixture(&docs);
    let prepared = PreparedQuery::new(
        Query::default().skip(2).limit(3),
        value_range(0, 100, true, true).with_sort_satisfied(true),
    );

    let result = execute_query(&indexes, &source, &prepared).unwrap();

    assert_eq!(ids(&result), vec!["d2", "d3", "d4"]);
    assert_eq!(result.rows_scanned, 5);
}

#[test]
fn unsatisfied_sort_scans_everything_then_sorts() {
    let docs = (0..6)
        .map(|n| row(&format!("d{n}"), n, "x"))
        .collect::<Vec<_>>();
    let (indexes, source) = fixture(&docs);
    let query = Query::default()
        .sort_by(SortField::desc(FieldPath::parse("value").unwrap()))
        .limit(2);
    let prepared = PreparedQuery::new(query, value_range(0, 100, true, true));

    let result = execute_query(&indexes, &source, &prepared).unwrap();

    assert_eq!(ids(&result), vec!["d5", "d4"]);
    assert_eq!(result.rows_scanned, 6);
}

#[test]
fn residual_selector_filters_rows_in_range() {
    let (indexes, source) = fixture(&[row("a", 1, "keep"), row("b", 2, "drop"), row("c", 3, "keep")]);
    let query = Query::new(Selector::parse(&json!({ "tag": "keep" })).unwrap());
    let prepared = PreparedQuery::new(query, QueryPlan::full_scan(&pk()));

    let result = execute_query(&indexes, &source, &prepared).unwrap();

    assert_eq!(ids(&result), vec!["a", "c"]);
}

#[test]
fn satisfied_selector_is_not_reapplied() {
    let (indexes, source) = fixture(&[row("a", 1, "x")]);
    let query = Query::new(Selector::parse(&json!({ "tag": "other" })).unwrap());
    let plan = QueryPlan::full_scan(&pk()).with_selector_satisfied(true);

    let result = execute_query(&indexes, &source, &PreparedQuery::new(query, plan)).unwrap();

    assert_eq!(ids(&result), vec!["a"]);
}

#[test]
fn deleted_documents_are_never_returned() {
    let mut dead = row("z", 5, "x");
    dead["_deleted"] = json!(true);
    let (indexes, source) = fixture(&[row("a", 5, "x"), dead]);
    let prepared = PreparedQuery::new(Query::default(), QueryPlan::full_scan(&pk()));

    let result = execute_query(&indexes, &source, &prepared).unwrap();

    assert_eq!(ids(&result), vec!["a"]);
}

#[test]
fn zero_limit_short_circuits() {
    let (indexes, source) = fixture(&[row("a", 5, "x")]);
    let prepared = PreparedQuery::new(Query::default().limit(0), QueryPlan::full_scan(&pk()));

    let result = execute_query(&indexes, &source, &prepared).unwrap();

    assert!(result.documents.is_empty());
    assert_eq!(result.rows_scanned, 0);
}

#[test]
fn unknown_index_is_an_invariant_violation() {
    let (indexes, source) = fixture(&[]);
    let plan = QueryPlan::field_range(&["tag"], &pk(), vec![], vec![], true, true);

    let err =
        execute_query(&indexes, &source, &PreparedQuery::new(Query::default(), plan)).unwrap_err();

    assert_eq!(err.class, ErrorClass::InvariantViolation);
}

#[test]
fn dangling_index_entry_is_an_invariant_violation() {
    let (indexes, mut source) = fixture(&[row("a", 5, "x")]);
    source.docs.clear();
    let prepared = PreparedQuery::new(Query::default(), QueryPlan::full_scan(&pk()));

    let err = execute_query(&indexes, &source, &prepared).unwrap_err();

    assert!(err.is_invariant_violation());
}

#[test]
fn mango_query_objects_parse() {
    let query = Query::from_json(&json!({
        "selector": { "value": { "$gt": 3 } },
        "sort": [{ "value": "desc" }, { "id": "asc" }],
        "skip": 1,
        "limit": 5
    }))
    .unwrap();

    assert_eq!(query.skip, 1);
    assert_eq!(query.limit, Some(5));
    assert_eq!(query.sort.len(), 2);
    assert_eq!(query.sort[0].direction, SortDirection::Desc);

    assert!(matches!(
        Query::from_json(&json!({ "sort": [{ "value": "up" }] })),
        Err(SelectorError::UnknownOperator(_))
    ));
}
