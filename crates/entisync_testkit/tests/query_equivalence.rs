//! In-memory storage answers queries exactly like the reference evaluator.

use entisync_protocol::Event;
use entisync_storage::{
    evaluate, MemoryStorage, Query, QueryRow, Sort, StateRow, Storage, WriteBatch,
};
use entisync_testkit::prelude::*;
use proptest::prelude::*;

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

/// What happens to a generated row before the query runs.
#[derive(Debug, Clone, Copy)]
enum Fate {
    Live,
    Deleted,
    Revived,
}

fn fate_strategy() -> impl Strategy<Value = Fate> {
    prop_oneof![
        3 => Just(Fate::Live),
        2 => Just(Fate::Deleted),
        1 => Just(Fate::Revived),
    ]
}

async fn commit(storage: &MemoryStorage, event: Event) -> String {
    let id = event.data_id().to_string();
    let batch = match StateRow::from_event(&event) {
        Some(state) => WriteBatch::new(NOTES).put_state(state),
        None => WriteBatch::new(NOTES).delete_state(id),
    };
    let event_id = event.event_id().to_string();
    storage.commit(batch.insert_event(event)).await.unwrap();
    event_id
}

/// Writes every row through insert/delete events and returns the rows the
/// evaluator should see: live rows plus tombstones.
async fn seed(storage: &MemoryStorage, rows: &[QueryRow], fates: &[Fate]) -> Vec<QueryRow> {
    let mut expected = Vec::new();
    for (row, fate) in rows.iter().zip(fates.iter().cycle()) {
        let payload = row.payload.clone().unwrap();
        let mut last = commit(
            storage,
            Event::create_insert(NOTES, &row.id, payload.clone(), true),
        )
        .await;

        if matches!(fate, Fate::Deleted | Fate::Revived) {
            last = commit(storage, Event::create_delete(NOTES, &row.id, true)).await;
        }
        if matches!(fate, Fate::Revived) {
            last = commit(
                storage,
                Event::create_insert(NOTES, &row.id, payload.clone(), true),
            )
            .await;
        }

        expected.push(QueryRow {
            id: row.id.clone(),
            payload: (!matches!(fate, Fate::Deleted)).then_some(payload),
            last_event_id: last,
        });
    }
    expected
}

proptest! {
    #![proptest_config(PropTestConfig::default().to_proptest_config())]

    #[test]
    fn memory_query_matches_evaluator(
        rows in rows_strategy(48),
        fates in prop::collection::vec(fate_strategy(), 1..8),
        query in query_strategy(NOTES),
        include_deleted in any::<bool>(),
    ) {
        let query = query.include_deleted(include_deleted);

        let (actual, expected) = run(async {
            let storage = MemoryStorage::new();
            storage.init().await.unwrap();
            let candidates = seed(&storage, &rows, &fates).await;
            (storage.query(&query).await.unwrap(), evaluate(&query, candidates))
        });

        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn pages_concatenate_to_full_result(
        rows in rows_strategy(48),
        page_size in 1usize..5,
    ) {
        let base = Query::new(NOTES).sort(Sort::asc("n"));
        let full = evaluate(&base, rows.clone());

        let mut paged = Vec::new();
        let mut offset = 0;
        loop {
            let page = evaluate(&base.clone().offset(offset).limit(page_size), rows.clone());
            if page.is_empty() {
                break;
            }
            offset += page.len();
            paged.extend(page);
        }

        prop_assert_eq!(paged, full);
    }
}

#[test]
fn large_mixed_type_sort_matches_evaluator() {
    use entisync_codec::Value;

    let rows: Vec<QueryRow> = (0..320)
        .map(|i| {
            let n = if i % 3 == 0 {
                Value::from("x")
            } else {
                Value::Integer(160 - i)
            };
            QueryRow {
                id: format!("{i:04}"),
                payload: Some(Value::map([("id", Value::from(format!("{i:04}"))), ("n", n)])),
                last_event_id: String::new(),
            }
        })
        .collect();

    for sort in [Sort::asc("n"), Sort::desc("n")] {
        let query = Query::new(NOTES).sort(sort);
        let (actual, expected) = run(async {
            let storage = MemoryStorage::new();
            storage.init().await.unwrap();
            let candidates = seed(&storage, &rows, &[Fate::Live]).await;
            (storage.query(&query).await.unwrap(), evaluate(&query, candidates))
        });

        assert_eq!(actual.len(), 320);
        assert_eq!(actual, expected);
    }

    let ascending = evaluate(&Query::new(NOTES).sort(Sort::asc("n")), rows);
    // numbers before text
    assert_eq!(ascending[0].payload.as_ref().unwrap().get("n"), Some(&Value::Integer(-159)));
    assert_eq!(ascending[319].payload.as_ref().unwrap().get("n"), Some(&Value::from("x")));
}
