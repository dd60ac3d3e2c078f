//! Canonical JSON encoding.
//!
//! Any object that is signed is first serialized with sorted keys and no
//! insignificant whitespace. Signer and verifier must produce byte-identical
//! bytes; callers must never re-parse and re-encode between signing and
//! verifying — see [`crate::crypto::keys`] for the envelope helpers that
//! enforce this.

use serde::Serialize;
use serde_json::{Map, Value};

/// Error produced while canonicalizing a value for signing.
#[derive(Debug, thiserror::Error)]
pub enum CanonicalJsonError {
    /// The value could not be represented as JSON.
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Serializes `payload` as canonical JSON: UTF-8, object keys sorted
/// ascending, no insignificant whitespace.
///
/// # Errors
///
/// Returns [`CanonicalJsonError`] if `payload` cannot be represented as JSON.
pub fn canonical_json_bytes<T: Serialize>(payload: &T) -> Result<Vec<u8>, CanonicalJsonError> {
    let value = serde_json::to_value(payload)?;
    let sorted = sort_keys(value);
    Ok(serde_json::to_vec(&sorted)?)
}

/// Recursively rebuilds a [`Value`] tree with every object's keys sorted
/// ascending. `serde_json`'s default `Map` preserves insertion order, so this
/// walk is the only thing that actually canonicalizes key order.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = Map::new();
            let mut keys: Vec<String> = map.keys().cloned().collect();
            keys.sort();
            for key in keys {
                if let Some(v) = map.get(&key) {
                    sorted.insert(key, sort_keys(v.clone()));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_object_keys() {
        let value = json!({"b": 1, "a": 2, "c": {"z": 1, "y": 2}});
        let bytes = canonical_json_bytes(&value).expect("serializes");
        assert_eq!(bytes, br#"{"a":2,"b":1,"c":{"y":2,"z":1}}"#);
    }

    #[test]
    fn is_deterministic_across_calls() {
        let value = json!({"x": [3, 2, 1], "a": "hello"});
        let first = canonical_json_bytes(&value).expect("serializes");
        let second = canonical_json_bytes(&value).expect("serializes");
        assert_eq!(first, second);
    }
}
