//! Conversion between [`Value`] and `serde_json`, and serde-based mapping of
//! typed records.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map_or(Value::Null, Value::Double),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Integer(n) => serde_json::Value::from(n),
            // Non-finite doubles have no JSON form.
            Value::Double(n) => serde_json::Number::from_f64(n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Text(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

/// Converts any serializable type into a [`Value`].
///
/// # Errors
///
/// Returns an error if the type cannot be represented (for example a map
/// with non-string keys).
pub fn to_value<T: Serialize + ?Sized>(data: &T) -> CodecResult<Value> {
    serde_json::to_value(data)
        .map(Value::from)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))
}

/// Converts a [`Value`] into any deserializable type.
///
/// # Errors
///
/// Returns an error if the value does not match the target type's shape.
pub fn from_value<T: DeserializeOwned>(value: &Value) -> CodecResult<T> {
    let json: serde_json::Value = value.clone().into();
    serde_json::from_value(json).map_err(|e| CodecError::decoding_failed(e.to_string()))
}
