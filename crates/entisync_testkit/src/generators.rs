//! Property-based test generators using proptest.
//!
//! Payloads are drawn over a small fixed field set so that generated
//! filters and sorts actually hit the generated data.

use entisync_codec::Value;
use entisync_storage::{Filter, Query, QueryRow, Sort};
use proptest::prelude::*;

/// Field names used by generated payloads and queries.
pub const FIELDS: [&str; 3] = ["a", "b", "n"];

/// Strategy for scalar field values, mixing types on purpose.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        1 => Just(Value::Null),
        1 => any::<bool>().prop_map(Value::Bool),
        3 => (-5i64..5).prop_map(Value::Integer),
        1 => (-5i32..5).prop_map(|n| Value::Double(f64::from(n) + 0.5)),
        2 => prop::sample::select(vec!["x", "y", "z"]).prop_map(Value::from),
    ]
}

/// Strategy for record ids.
pub fn record_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-f0-9]{1,4}").expect("Invalid regex")
}

/// Strategy for record payloads with `id` set to `id`.
pub fn payload_strategy(id: String) -> impl Strategy<Value = Value> {
    prop::collection::vec(
        (prop::sample::select(FIELDS.to_vec()), scalar_strategy()),
        0..4,
    )
    .prop_map(move |fields| {
        let mut pairs: Vec<(String, Value)> = fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        pairs.push(("id".to_string(), Value::from(id.as_str())));
        Value::map(pairs)
    })
}

/// Strategy for live query rows with distinct ids.
pub fn rows_strategy(max_rows: usize) -> impl Strategy<Value = Vec<QueryRow>> {
    prop::collection::btree_set(record_id_strategy(), 0..max_rows)
        .prop_flat_map(|ids| {
            ids.into_iter()
                .map(|id| {
                    payload_strategy(id.clone()).prop_map(move |payload| QueryRow {
                        id: id.clone(),
                        payload: Some(payload),
                        last_event_id: format!("event-{id}"),
                    })
                })
                .collect::<Vec<_>>()
        })
}

/// Strategy for a single filter over [`FIELDS`].
pub fn filter_strategy() -> impl Strategy<Value = Filter> {
    let field = prop::sample::select(FIELDS.to_vec());
    (field, scalar_strategy(), 0u8..10, prop::collection::vec(scalar_strategy(), 0..3))
        .prop_map(|(field, value, kind, list)| match kind {
            0 => Filter::equals(field, value),
            1 => Filter::not_equals(field, value),
            2 => Filter::less_than(field, value),
            3 => Filter::less_than_or_equal(field, value),
            4 => Filter::greater_than(field, value),
            5 => Filter::greater_than_or_equal(field, value),
            6 => Filter::is_null(field),
            7 => Filter::is_not_null(field),
            8 => Filter::in_list(field, list),
            _ => Filter::not_in(field, list),
        })
}

/// Strategy for queries over `repository`.
pub fn query_strategy(repository: &'static str) -> impl Strategy<Value = Query> {
    (
        prop::collection::vec(filter_strategy(), 0..3),
        prop::collection::vec((prop::sample::select(FIELDS.to_vec()), any::<bool>()), 0..3),
        prop::option::of(0usize..6),
        0usize..4,
    )
        .prop_map(move |(filters, sorts, limit, offset)| {
            let mut query = Query::new(repository).offset(offset);
            for filter in filters {
                query = query.filter(filter);
            }
            for (field, descending) in sorts {
                query = query.sort(if descending {
                    Sort::desc(field)
                } else {
                    Sort::asc(field)
                });
            }
            if let Some(limit) = limit {
                query = query.limit(limit);
            }
            query
        })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn payload_carries_id(
            (id, payload) in record_id_strategy()
                .prop_flat_map(|id| (Just(id.clone()), payload_strategy(id)))
        ) {
            prop_assert_eq!(payload.get("id"), Some(&Value::from(id.as_str())));
        }

        #[test]
        fn rows_have_distinct_ids(rows in rows_strategy(8)) {
            let mut ids: Vec<_> = rows.iter().map(|r| r.id.clone()).collect();
            ids.dedup();
            prop_assert_eq!(ids.len(), rows.len());
            prop_assert!(rows.iter().all(|r| r.payload.as_ref().is_some_and(Value::is_map)));
        }

        #[test]
        fn queries_target_repository(query in query_strategy("notes")) {
            prop_assert_eq!(query.repository(), "notes");
            prop_assert!(query.filters().len() < 3);
        }
    }
}
