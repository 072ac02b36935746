//! CBOR encoding for byte-oriented backends.
//!
//! Maps are backed by `BTreeMap`, so identical values always produce
//! identical bytes.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Encode a value to CBOR bytes.
///
/// # Errors
///
/// Returns an error if the underlying writer fails.
pub fn to_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::into_writer(value, &mut buffer)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buffer)
}

/// Decode a value from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid CBOR, or contain constructs
/// with no `Value` counterpart (byte strings, non-text map keys, tags).
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_document_survives_cbor() {
        let value = Value::map([
            (
                "users",
                Value::Array(vec![
                    Value::map([("name", Value::from("Alice")), ("age", Value::Integer(30))]),
                    Value::map([("name", Value::from("Bob")), ("score", Value::Double(9.5))]),
                ]),
            ),
            ("count", Value::Integer(2)),
            ("archived", Value::Null),
        ]);

        let bytes = to_cbor(&value).unwrap();
        assert_eq!(from_cbor(&bytes).unwrap(), value);
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = Value::map([("b", Value::Integer(1)), ("a", Value::Integer(2))]);
        let b = Value::map([("a", Value::Integer(2)), ("b", Value::Integer(1))]);
        assert_eq!(to_cbor(&a).unwrap(), to_cbor(&b).unwrap());
    }

    #[test]
    fn truncated_input_is_rejected() {
        let bytes = to_cbor(&Value::from("hello world")).unwrap();
        let result = from_cbor(&bytes[..bytes.len() - 3]);
        assert!(matches!(result, Err(CodecError::DecodingFailed { .. })));
    }
}
