//! Mapping between typed records and payload values.

use crate::error::{CoreError, CoreResult};
use entisync_codec::{from_value, to_value, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

type ToValueFn<T> = Arc<dyn Fn(&T) -> CoreResult<Value> + Send + Sync>;
type FromValueFn<T> = Arc<dyn Fn(&Value) -> CoreResult<T> + Send + Sync>;

/// Converts records of type `T` to payload maps and back.
///
/// Both functions must be pure: the engine may call them any number of
/// times, and `from_value(to_value(r))` must describe the same record.
///
/// # Example
///
/// ```rust
/// use entisync_core::RecordMapper;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Note {
///     id: String,
///     title: String,
/// }
///
/// let mapper = RecordMapper::<Note>::serde();
/// let payload = mapper
///     .to_value(&Note { id: "1".into(), title: "hello".into() })
///     .unwrap();
/// assert_eq!(payload.get("title").and_then(|v| v.as_text()), Some("hello"));
/// ```
pub struct RecordMapper<T> {
    to_value: ToValueFn<T>,
    from_value: FromValueFn<T>,
}

impl<T> RecordMapper<T> {
    /// Creates a mapper from two conversion functions.
    pub fn new<F, G>(to_value: F, from_value: G) -> Self
    where
        F: Fn(&T) -> CoreResult<Value> + Send + Sync + 'static,
        G: Fn(&Value) -> CoreResult<T> + Send + Sync + 'static,
    {
        Self {
            to_value: Arc::new(to_value),
            from_value: Arc::new(from_value),
        }
    }

    /// Converts a record to its payload.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the payload is not a map.
    pub fn to_value(&self, record: &T) -> CoreResult<Value> {
        let value = (self.to_value)(record)?;
        if !value.is_map() {
            return Err(CoreError::validation(format!(
                "record must map to a map payload, got {}",
                value.type_name()
            )));
        }
        Ok(value)
    }

    /// Converts a payload back to a record.
    pub fn from_value(&self, value: &Value) -> CoreResult<T> {
        (self.from_value)(value)
    }
}

impl<T> RecordMapper<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Creates a mapper that goes through `serde`.
    pub fn serde() -> Self {
        Self::new(
            |record: &T| Ok(to_value(record)?),
            |value: &Value| Ok(from_value(value)?),
        )
    }
}

impl<T> Clone for RecordMapper<T> {
    fn clone(&self) -> Self {
        Self {
            to_value: Arc::clone(&self.to_value),
            from_value: Arc::clone(&self.from_value),
        }
    }
}

impl<T> fmt::Debug for RecordMapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordMapper")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}
