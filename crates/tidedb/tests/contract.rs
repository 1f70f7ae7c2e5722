use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tidedb::{
    core::{
        clock::{Clock, ManualClock},
        db::storage::{KvStorageInstance, MemoryKv},
        obs::StorageMetrics,
    },
    prelude::*,
};

const ITEMS: &str = r#"{
    "primaryKey": "id",
    "properties": {
        "id": { "type": "string", "maxLength": 12 },
        "value": { "type": "integer", "minimum": 0, "maximum": 100 },
        "tag": { "type": "string", "maxLength": 8 }
    },
    "indexes": ["value", ["tag", "value"]]
}"#;

struct Fixture {
    db: Database<MemoryKv>,
    clock: Arc<ManualClock>,
    metrics: Arc<StorageMetrics>,
}

fn fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new(100.0));
    let metrics = Arc::new(StorageMetrics::new());
    let db = Database::with_parts(
        "app",
        MemoryKv::new(),
        StorageSettings::default(),
        clock.clone(),
        metrics.clone(),
    )
    .unwrap();

    Fixture { db, clock, metrics }
}

fn body(value: Value) -> Document {
    let mut doc = Document::try_from(value).unwrap();
    doc.set_at("_deleted", json!(false));
    doc
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

fn value_range(lower: i64, upper: i64) -> PreparedQuery {
    PreparedQuery::new(
        Query::default(),
        QueryPlan::field_range(
            &["value"],
            &pk(),
            vec![IndexBound::value(lower)],
            vec![IndexBound::value(upper)],
            true,
            false,
        )
        .with_sort_satisfied(true),
    )
}

/// Insert through the write contract, stamping revision and lwt from the clock.
fn insert(items: &KvStorageInstance<MemoryKv>, clock: &ManualClock, value: Value) -> Document {
    let doc = stamp_write(None, body(value), clock.now());
    let response = items
        .bulk_write(vec![BulkWriteRow::insert(doc)], "insert")
        .unwrap();
    assert!(response.error.is_empty());

    response.success[0].clone()
}

fn update(
    items: &KvStorageInstance<MemoryKv>,
    clock: &ManualClock,
    previous: &Document,
    next: Document,
) -> BulkWriteResponse {
    let next = stamp_write(Some(previous), next, clock.now());

    items
        .bulk_write(vec![BulkWriteRow::update(previous.clone(), next)], "update")
        .unwrap()
}

#[test]
fn insert_query_conflict_delete_cleanup() {
    let f = fixture();
    let items = f.db.collection_from_json("items", ITEMS).unwrap();

    let a = insert(&items, &f.clock, json!({ "id": "a", "value": 5 }));
    assert_eq!(a.lwt(), 100.0);
    assert_eq!(a.revision().unwrap().unwrap().height(), 1);
    assert_eq!(ids(&items.query(&value_range(0, 10)).unwrap()), vec!["a"]);

    // the caller's view of "a" is a revision that never existed
    let mut stale = a.clone();
    stale.set_at("_rev", json!("1-stale"));
    let response = update(&items, &f.clock, &stale, body(json!({ "id": "a", "value": 6 })));
    assert!(response.success.is_empty());
    assert!(response.error[0].is_conflict());
    assert_eq!(response.error[0].document_in_db, a);

    let deleted = update(&items, &f.clock, &a, a.clone().with_deleted(true));
    assert_eq!(deleted.success.len(), 1);
    assert!(items.query(&value_range(0, 10)).unwrap().documents.is_empty());

    f.clock.set(50.0);
    assert!(items.cleanup(1_000.0).unwrap());
    assert_eq!(items.find_documents_by_id(&["a"], true).unwrap().len(), 1);

    f.clock.set(1_200.0);
    assert!(items.cleanup(1_000.0).unwrap());
    assert!(items.find_documents_by_id(&["a"], true).unwrap().is_empty());
    assert_eq!(f.db.storage().backend().len(), 1);
    assert_eq!(f.metrics.report().ops.purged, 1);
}

#[test]
fn losing_writer_rederives_from_the_conflict() {
    let f = fixture();
    let items = f.db.collection_from_json("items", ITEMS).unwrap();
    let base = insert(&items, &f.clock, json!({ "id": "a", "value": 1 }));

    f.clock.advance(1.0);
    let first = update(&items, &f.clock, &base, body(json!({ "id": "a", "value": 2 })));
    assert_eq!(first.success.len(), 1);

    f.clock.advance(1.0);
    let second = update(&items, &f.clock, &base, body(json!({ "id": "a", "value": 3 })));
    let conflict = &second.error[0];
    assert_eq!(conflict.document_in_db, first.success[0]);

    let retried = update(
        &items,
        &f.clock,
        &conflict.document_in_db,
        body(json!({ "id": "a", "value": 3 })),
    );
    assert_eq!(retried.success.len(), 1);

    let current = items.find_documents_by_id(&["a"], false).unwrap();
    assert_eq!(current[0].field_at("value"), Some(&json!(3)));
    assert_eq!(current[0].revision().unwrap().unwrap().height(), 3);
}

#[test]
fn mango_selector_runs_as_residual_filter() {
    let f = fixture();
    let items = f.db.collection_from_json("items", ITEMS).unwrap();
    for (id, value, tag) in [
        ("a", 1, "red"),
        ("b", 4, "blue"),
        ("c", 7, "red"),
        ("d", 9, "red"),
        ("e", 12, "green"),
    ] {
        insert(&items, &f.clock, json!({ "id": id, "value": value, "tag": tag }));
    }

    let query = Query::from_json(&json!({
        "selector": { "value": { "$gte": 3 }, "tag": { "$in": ["red", "green"] } },
        "sort": [{ "value": "desc" }],
        "limit": 2
    }))
    .unwrap();
    let result = items
        .query(&PreparedQuery::new(query, QueryPlan::full_scan(&pk())))
        .unwrap();

    assert_eq!(ids(&result), vec!["e", "d"]);
    assert_eq!(result.rows_scanned, 5);
}

#[test]
fn compound_index_prefix_range() {
    let f = fixture();
    let items = f.db.collection_from_json("items", ITEMS).unwrap();
    for (id, value, tag) in [("a", 3, "red"), ("b", 1, "red"), ("c", 2, "blue")] {
        insert(&items, &f.clock, json!({ "id": id, "value": value, "tag": tag }));
    }

    let plan = QueryPlan::field_range(
        &["tag", "value"],
        &pk(),
        vec![IndexBound::value("red")],
        vec![IndexBound::value("red")],
        true,
        true,
    )
    .with_selector_satisfied(true)
    .with_sort_satisfied(true);
    let result = items
        .query(&PreparedQuery::new(Query::default(), plan))
        .unwrap();

    assert_eq!(ids(&result), vec!["b", "a"]);
}

#[test]
fn follower_catches_up_then_tails_the_stream() {
    let f = fixture();
    let source = f.db.collection_from_json("source", ITEMS).unwrap();
    let target = f.db.collection_from_json("target", ITEMS).unwrap();
    for n in 0..5 {
        f.clock.advance(1.0);
        insert(&source, &f.clock, json!({ "id": format!("d{n}"), "value": n }));
    }

    // catch up in pages
    let mut checkpoint: Option<Checkpoint> = None;
    loop {
        let page = source
            .changed_documents_since(2, checkpoint.as_ref())
            .unwrap();
        if page.documents.is_empty() {
            break;
        }
        let rows = page
            .documents
            .into_iter()
            .map(BulkWriteRow::insert)
            .collect();
        target.bulk_write(rows, "replicate").unwrap();
        checkpoint = page.checkpoint;
    }
    assert_eq!(target.info().unwrap().total_count, 5);

    // tail live changes from the same checkpoint
    let mut stream = source
        .change_stream_from(checkpoint.as_ref().unwrap())
        .unwrap();
    f.clock.advance(1.0);
    insert(&source, &f.clock, json!({ "id": "live", "value": 50 }));

    let bulk = stream.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(bulk.events.len(), 1);
    assert_eq!(bulk.events[0].document_id, "live");
    assert_eq!(bulk.events[0].operation, ChangeOperation::Insert);
    assert_eq!(stream.last_checkpoint(), bulk.checkpoint.as_ref());

    source.close().unwrap();
    assert_eq!(stream.recv(), None);
    assert_eq!(stream.end(), Some(&StreamEnd::Completed));
}

#[test]
fn settings_load_from_toml() {
    let db = Database::memory_from_toml("app", "cleanup_batch_size = 1\nreplay_capacity = 4\n")
        .unwrap();
    assert_eq!(db.storage().settings().cleanup_batch_size, 1);
    assert_eq!(db.storage().settings().replay_capacity, 4);
    assert_eq!(
        db.storage().settings().max_read_retries,
        StorageSettings::DEFAULT_MAX_READ_RETRIES
    );

    let err = Database::memory_from_toml("app", "cleanup_batch_size = 0\n")
        .err()
        .unwrap();
    assert_eq!(err.kind, ErrorKind::Config);
}

#[test]
fn invalid_schemas_are_rejected_before_opening() {
    let db = Database::memory("app");
    let err = db
        .collection_from_json(
            "items",
            r#"{ "primaryKey": "id", "properties": { "id": { "type": "string" } } }"#,
        )
        .err()
        .unwrap();

    assert_eq!(err.kind, ErrorKind::Schema);

    let err = db
        .collection_from_json(
            "scores",
            r#"{
                "primaryKey": "id",
                "properties": {
                    "id": { "type": "string", "maxLength": 4 },
                    "score": { "type": "number", "minimum": 0, "maximum": 10 }
                },
                "indexes": ["score"]
            }"#,
        )
        .err()
        .unwrap();
    assert_eq!(err.kind, ErrorKind::Schema);
    assert!(err.message.contains("multipleOf"));
    assert_eq!(db.storage().open_collections(), 0);
}

#[test]
fn closed_collections_surface_closed_errors() {
    let db = Database::memory("app");
    let items = db.collection_from_json("items", ITEMS).unwrap();
    items.remove().unwrap();

    let err = Error::from(items.query(&value_range(0, 10)).unwrap_err());
    assert!(err.is_closed());
    assert_eq!(err.origin, tidedb::ErrorOrigin::Storage);

    let err = Error::from(items.attachment_data("a", "f", "d").unwrap_err());
    assert!(err.is_closed());
}

#[test]
fn attachments_are_unsupported() {
    let db = Database::memory("app");
    let items = db.collection_from_json("items", ITEMS).unwrap();

    let err = Error::from(items.attachment_data("a", "f", "d").unwrap_err());
    assert_eq!(err.kind, ErrorKind::Unsupported);
}

#[test]
fn version_is_exported() {
    assert!(!tidedb::VERSION.is_empty());
}
