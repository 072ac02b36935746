//! Metadata values.

use crate::error::StorageError;
use entisync_codec::Value;

/// A value stored in the metadata table.
///
/// Metadata holds small bookkeeping entries such as sync cursors or the last
/// pull time. Only scalar types and lists of text are supported.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Double(f64),
    /// Text value.
    Text(String),
    /// List of text values.
    TextList(Vec<String>),
}

impl MetaValue {
    /// Returns the boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer, if this is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetaValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the text, if this is one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the text list, if this is one.
    pub fn as_text_list(&self) -> Option<&[String]> {
        match self {
            MetaValue::TextList(list) => Some(list),
            _ => None,
        }
    }
}

impl TryFrom<Value> for MetaValue {
    type Error = StorageError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(b) => Ok(MetaValue::Bool(b)),
            Value::Integer(i) => Ok(MetaValue::Int(i)),
            Value::Double(d) => Ok(MetaValue::Double(d)),
            Value::Text(s) => Ok(MetaValue::Text(s)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Text(s) => Ok(s),
                    other => Err(StorageError::InvalidMetaValue(format!(
                        "list items must be text, got {}",
                        other.type_name()
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(MetaValue::TextList),
            other => Err(StorageError::InvalidMetaValue(format!(
                "unsupported type {}",
                other.type_name()
            ))),
        }
    }
}

impl From<MetaValue> for Value {
    fn from(meta: MetaValue) -> Self {
        match meta {
            MetaValue::Bool(b) => Value::Bool(b),
            MetaValue::Int(i) => Value::Integer(i),
            MetaValue::Double(d) => Value::Double(d),
            MetaValue::Text(s) => Value::Text(s),
            MetaValue::TextList(list) => Value::Array(list.into_iter().map(Value::Text).collect()),
        }
    }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self {
        MetaValue::Bool(b)
    }
}

impl From<i64> for MetaValue {
    fn from(i: i64) -> Self {
        MetaValue::Int(i)
    }
}

impl From<f64> for MetaValue {
    fn from(d: f64) -> Self {
        MetaValue::Double(d)
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Text(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Text(s)
    }
}

impl From<Vec<String>> for MetaValue {
    fn from(list: Vec<String>) -> Self {
        MetaValue::TextList(list)
    }
}
