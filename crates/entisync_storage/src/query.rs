//! Query model.
//!
//! Filters and sorts address payload fields by name; a dotted name walks
//! nested maps. A field that does not exist reads as `Value::Null`.

use entisync_codec::Value;
use std::cmp::Ordering;

/// Comparison applied by a [`Filter`].
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// Field equals the value (integers and doubles compare numerically).
    Equals(Value),
    /// Field does not equal the value.
    NotEquals(Value),
    /// Field is strictly less than the value.
    LessThan(Value),
    /// Field is less than or equal to the value.
    LessThanOrEqual(Value),
    /// Field is strictly greater than the value.
    GreaterThan(Value),
    /// Field is greater than or equal to the value.
    GreaterThanOrEqual(Value),
    /// Field is null or missing.
    IsNull,
    /// Field is present and not null.
    IsNotNull,
    /// Field equals one of the values.
    In(Vec<Value>),
    /// Field equals none of the values.
    NotIn(Vec<Value>),
}

/// A predicate on one payload field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    field: String,
    op: FilterOp,
}

impl Filter {
    /// Creates a filter from a field and an operator.
    pub fn new(field: impl Into<String>, op: FilterOp) -> Self {
        Self {
            field: field.into(),
            op,
        }
    }

    /// `field == value`.
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Equals(value.into()))
    }

    /// `field != value`.
    pub fn not_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::NotEquals(value.into()))
    }

    /// `field < value`.
    pub fn less_than(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::LessThan(value.into()))
    }

    /// `field <= value`.
    pub fn less_than_or_equal(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::LessThanOrEqual(value.into()))
    }

    /// `field > value`.
    pub fn greater_than(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::GreaterThan(value.into()))
    }

    /// `field >= value`.
    pub fn greater_than_or_equal(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::GreaterThanOrEqual(value.into()))
    }

    /// `field` is null or missing.
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOp::IsNull)
    }

    /// `field` is present and not null.
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOp::IsNotNull)
    }

    /// `field` is one of `values`.
    pub fn in_list<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::new(field, FilterOp::In(values.into_iter().map(Into::into).collect()))
    }

    /// `field` is none of `values`.
    pub fn not_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::new(
            field,
            FilterOp::NotIn(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Returns the field name.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Returns the operator.
    pub fn op(&self) -> &FilterOp {
        &self.op
    }

    /// Returns true for an `In` filter with no values, which no row can
    /// satisfy.
    pub fn is_unsatisfiable(&self) -> bool {
        matches!(&self.op, FilterOp::In(values) if values.is_empty())
    }

    /// Evaluates the filter against a payload.
    pub fn matches(&self, payload: &Value) -> bool {
        let field = payload.get_path(&self.field).unwrap_or(&Value::Null);
        let ordered = |expected: &Value, accept: fn(Ordering) -> bool| {
            field.compare(expected).is_some_and(accept)
        };

        match &self.op {
            FilterOp::Equals(v) => field.loosely_equals(v),
            FilterOp::NotEquals(v) => !field.loosely_equals(v),
            FilterOp::LessThan(v) => ordered(v, Ordering::is_lt),
            FilterOp::LessThanOrEqual(v) => ordered(v, Ordering::is_le),
            FilterOp::GreaterThan(v) => ordered(v, Ordering::is_gt),
            FilterOp::GreaterThanOrEqual(v) => ordered(v, Ordering::is_ge),
            FilterOp::IsNull => field.is_null(),
            FilterOp::IsNotNull => !field.is_null(),
            FilterOp::In(values) => values.iter().any(|v| field.loosely_equals(v)),
            FilterOp::NotIn(values) => !values.iter().any(|v| field.loosely_equals(v)),
        }
    }
}

/// Sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// Payload field to sort by.
    pub field: String,
    /// Sort descending instead of ascending.
    pub descending: bool,
}

impl Sort {
    /// Ascending sort on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    /// Descending sort on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }

    /// Compares two payloads on this key.
    ///
    /// This is a total order (see [`Value::sort_cmp`]), so fields holding
    /// values of different kinds group by kind instead of failing the sort.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let left = a.get_path(&self.field).unwrap_or(&Value::Null);
        let right = b.get_path(&self.field).unwrap_or(&Value::Null);
        let ordering = left.sort_cmp(right);
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// A query against one repository.
///
/// All filters are ANDed. Rows are sorted by the sort keys in order, ties
/// keep storage order (ascending id), then `offset` rows are skipped and at
/// most `limit` rows are returned.
///
/// ```
/// use entisync_storage::{Filter, Query, Sort};
///
/// let query = Query::new("notes")
///     .filter(Filter::greater_than("priority", 2))
///     .sort(Sort::desc("priority"))
///     .limit(10);
/// assert_eq!(query.repository(), "notes");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    repository: String,
    filters: Vec<Filter>,
    sorts: Vec<Sort>,
    limit: Option<usize>,
    offset: Option<usize>,
    include_deleted: bool,
}

impl Query {
    /// Creates a query returning every live row of `repository`.
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            filters: Vec::new(),
            sorts: Vec::new(),
            limit: None,
            offset: None,
            include_deleted: false,
        }
    }

    /// Adds a filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Adds a sort key after the existing ones.
    #[must_use]
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sorts.push(sort);
        self
    }

    /// Limits the number of returned rows.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips rows before returning.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Also return tombstone rows of deleted records.
    #[must_use]
    pub fn include_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }

    /// Returns the repository name.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Returns the filters.
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Returns the sort keys.
    pub fn sorts(&self) -> &[Sort] {
        &self.sorts
    }

    /// Returns the limit, if any.
    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    /// Returns the offset (0 when unset).
    pub fn offset_value(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    /// Returns true if tombstones are requested.
    pub fn includes_deleted(&self) -> bool {
        self.include_deleted
    }

    /// Returns true if no row can match, so storage need not be read.
    pub fn is_unsatisfiable(&self) -> bool {
        self.filters.iter().any(Filter::is_unsatisfiable) || self.limit == Some(0)
    }

    /// Returns true if the payload satisfies every filter.
    pub fn matches(&self, payload: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(payload))
    }

    /// Compares two payloads on the sort keys.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        self.sorts
            .iter()
            .map(|s| s.compare(a, b))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

/// One row returned by a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    /// Record id.
    pub id: String,
    /// Current payload, `None` for tombstones.
    pub payload: Option<Value>,
    /// Id of the event that produced this row.
    pub last_event_id: String,
}

impl QueryRow {
    /// Returns true for tombstone rows.
    pub fn is_tombstone(&self) -> bool {
        self.payload.is_none()
    }

    /// Returns the payload filters and sorts see: tombstones read as an
    /// empty map.
    pub fn visible_payload(&self) -> std::borrow::Cow<'_, Value> {
        match &self.payload {
            Some(payload) => std::borrow::Cow::Borrowed(payload),
            None => std::borrow::Cow::Owned(Value::empty_map()),
        }
    }
}
