//! Reference query evaluator.
//!
//! Every backend must return exactly what [`evaluate`] returns for the same
//! candidate rows. Backends that translate queries to a native language test
//! themselves against it.

use crate::query::{Query, QueryRow};

/// Evaluates `query` over candidate rows of its repository.
///
/// `rows` holds every live row and every tombstone row (payload `None`) in any
/// order. Tombstones are dropped unless the query includes deleted rows, in
/// which case they are filtered and sorted as empty payloads.
pub fn evaluate(query: &Query, rows: impl IntoIterator<Item = QueryRow>) -> Vec<QueryRow> {
    if query.is_unsatisfiable() {
        return Vec::new();
    }

    // storage order
    let mut rows: Vec<QueryRow> = rows.into_iter().collect();
    rows.sort_by(|a, b| a.id.cmp(&b.id));

    let mut matched: Vec<QueryRow> = rows
        .into_iter()
        .filter(|row| query.includes_deleted() || !row.is_tombstone())
        .filter(|row| query.matches(&row.visible_payload()))
        .collect();

    if !query.sorts().is_empty() {
        matched.sort_by(|a, b| query.compare(&a.visible_payload(), &b.visible_payload()));
    }

    let offset = query.offset_value();
    if offset >= matched.len() {
        return Vec::new();
    }
    let end = query
        .limit_value()
        .map_or(matched.len(), |limit| offset.saturating_add(limit).min(matched.len()));

    matched.drain(offset..end).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Filter, Sort};
    use entisync_codec::Value;

    fn row(id: &str, priority: i64) -> QueryRow {
        QueryRow {
            id: id.into(),
            payload: Some(Value::map([
                ("id", Value::from(id)),
                ("priority", Value::Integer(priority)),
            ])),
            last_event_id: format!("e-{id}"),
        }
    }

    fn tombstone(id: &str) -> QueryRow {
        QueryRow {
            id: id.into(),
            payload: None,
            last_event_id: format!("d-{id}"),
        }
    }

    fn ids(rows: &[QueryRow]) -> Vec<&str> {
        rows.iter().map(|r| r.id.as_str()).collect()
    }

    fn sample() -> Vec<QueryRow> {
        vec![row("c", 1), row("a", 2), tombstone("b"), row("d", 2)]
    }

    #[test]
    fn storage_order_is_ascending_id() {
        let result = evaluate(&Query::new("notes"), sample());
        assert_eq!(ids(&result), ["a", "c", "d"]);
    }

    #[test]
    fn sort_is_stable() {
        let query = Query::new("notes").sort(Sort::desc("priority"));
        let result = evaluate(&query, sample());
        assert_eq!(ids(&result), ["a", "d", "c"]);
    }

    #[test]
    fn tombstones_only_when_requested() {
        let query = Query::new("notes").include_deleted(true);
        let result = evaluate(&query, sample());
        assert_eq!(ids(&result), ["a", "b", "c", "d"]);
        assert!(result[1].is_tombstone());

        // tombstones have no fields
        let filtered = evaluate(&query.filter(Filter::is_not_null("priority")), sample());
        assert_eq!(ids(&filtered), ["a", "c", "d"]);
    }

    #[test]
    fn pagination_boundaries() {
        let query = Query::new("notes");
        assert_eq!(ids(&evaluate(&query.clone().offset(1).limit(1), sample())), ["c"]);
        assert_eq!(ids(&evaluate(&query.clone().offset(2).limit(5), sample())), ["d"]);
        assert!(evaluate(&query.clone().offset(3), sample()).is_empty());
        assert!(evaluate(&query.clone().offset(10), sample()).is_empty());
        assert!(evaluate(&query.clone().limit(0), sample()).is_empty());
        assert_eq!(evaluate(&query.limit(usize::MAX).offset(1), sample()).len(), 2);
    }

    #[test]
    fn empty_in_matches_nothing() {
        let query = Query::new("notes").filter(Filter::in_list("id", Vec::<Value>::new()));
        assert!(evaluate(&query, sample()).is_empty());
    }
}
