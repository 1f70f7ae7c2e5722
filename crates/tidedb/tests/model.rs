use proptest::prelude::*;
use serde_json::json;
use std::{collections::BTreeMap, sync::Arc};
use tidedb::{
    core::{
        clock::{Clock, ManualClock},
        db::storage::{KvStorageInstance, MemoryKv},
        obs::NoopMetricsSink,
    },
    prelude::*,
};

const SCHEMA: &str = r#"{
    "primaryKey": "id",
    "properties": {
        "id": { "type": "string", "maxLength": 4 },
        "value": { "type": "integer", "minimum": 0, "maximum": 50 }
    },
    "indexes": ["value"]
}"#;

#[derive(Clone, Debug)]
enum Op {
    Put { id: u8, value: i64 },
    Delete { id: u8 },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..6_u8, 0..=50_i64).prop_map(|(id, value)| Op::Put { id, value }),
        1 => (0..6_u8).prop_map(|id| Op::Delete { id }),
    ]
}

fn pk() -> FieldPath {
    FieldPath::parse("id").unwrap()
}

fn value_of(doc: &Document) -> i64 {
    doc.field_at("value").and_then(serde_json::Value::as_i64).unwrap()
}

/// Apply `ops` through the storage contract and mirror them in a plain map.
fn replay(
    items: &KvStorageInstance<MemoryKv>,
    clock: &ManualClock,
    ops: &[Op],
) -> BTreeMap<String, Document> {
    let mut model: BTreeMap<String, Document> = BTreeMap::new();

    for op in ops {
        clock.advance(1.0);
        let (id, next) = match op {
            Op::Put { id, value } => {
                let id = format!("k{id}");
                let body = json!({ "id": id, "value": value, "_deleted": false });
                (id, Document::try_from(body).unwrap())
            }
            Op::Delete { id } => {
                let id = format!("k{id}");
                let Some(current) = model.get(&id) else {
                    continue;
                };
                (id, current.clone().with_deleted(true))
            }
        };

        let previous = model.get(&id);
        let stamped = stamp_write(previous, next, clock.now());
        let row = match previous {
            Some(previous) => BulkWriteRow::update(previous.clone(), stamped.clone()),
            None => BulkWriteRow::insert(stamped.clone()),
        };

        let response = items.bulk_write(vec![row], "model").unwrap();
        assert!(response.error.is_empty());
        model.insert(id, stamped);
    }

    model
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn index_range_matches_model(
        ops in prop::collection::vec(arb_op(), 1..40),
        lower in 0..=50_i64,
        width in 0..=50_i64,
    ) {
        let clock = Arc::new(ManualClock::new(100.0));
        let db = Database::with_parts(
            "model",
            MemoryKv::new(),
            StorageSettings::default(),
            clock.clone(),
            Arc::new(NoopMetricsSink),
        )
        .unwrap();
        let items = db.collection_from_json("items", SCHEMA).unwrap();
        let model = replay(&items, &clock, &ops);

        // bounds beyond the declared maximum clamp to it
        let upper = (lower + width).min(50);
        let plan = QueryPlan::field_range(
            &["value"],
            &pk(),
            vec![IndexBound::value(lower)],
            vec![IndexBound::value(upper)],
            true,
            false,
        )
        .with_sort_satisfied(true);
        let result = items
            .query(&PreparedQuery::new(Query::default(), plan))
            .unwrap();
        let got = result
            .documents
            .iter()
            .map(|doc| (value_of(doc), doc.primary_key(&pk()).unwrap().to_string()))
            .collect::<Vec<_>>();

        let mut expected = model
            .values()
            .filter(|doc| !doc.is_deleted())
            .map(|doc| (value_of(doc), doc.primary_key(&pk()).unwrap().to_string()))
            .filter(|(value, _)| (lower..upper).contains(value))
            .collect::<Vec<_>>();
        expected.sort();

        prop_assert_eq!(got, expected);
    }

    #[test]
    fn change_feed_matches_model(ops in prop::collection::vec(arb_op(), 1..40)) {
        let clock = Arc::new(ManualClock::new(100.0));
        let db = Database::with_parts(
            "model",
            MemoryKv::new(),
            StorageSettings::default(),
            clock.clone(),
            Arc::new(NoopMetricsSink),
        )
        .unwrap();
        let items = db.collection_from_json("items", SCHEMA).unwrap();
        let model = replay(&items, &clock, &ops);

        let mut fed = Vec::new();
        let mut checkpoint: Option<Checkpoint> = None;
        loop {
            let page = items.changed_documents_since(3, checkpoint.as_ref()).unwrap();
            if page.documents.is_empty() {
                break;
            }
            fed.extend(page.documents);
            checkpoint = page.checkpoint;
        }

        let mut expected = model.into_values().collect::<Vec<_>>();
        expected.sort_by(|a, b| a.lwt().total_cmp(&b.lwt()));

        prop_assert_eq!(fed, expected);
        let all = items.changed_documents_since(usize::MAX, None).unwrap();
        prop_assert_eq!(items.info().unwrap().total_count, all.documents.len());
    }
}
