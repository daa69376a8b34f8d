//! Canonical JSON and content hashing.
//!
//! "Canonical" means object keys sorted and non-JSON-native values
//! stringified, matching the on-disk format §6 of the memo/checkpoint
//! stores demand for stable content hashes.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Recursively sort every object's keys, producing a value whose
/// serialization is stable regardless of insertion order.
fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Value> =
                std::collections::BTreeMap::new();
            for (k, v) in map {
                sorted.insert(k.clone(), sort_keys(v));
            }
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Render `value` as canonical JSON text: sorted keys, compact separators.
///
/// # Errors
/// Returns an error if `value` cannot be serialized (it already is a
/// `serde_json::Value`, so this only fails for NaN/Infinity floats).
pub fn to_canonical_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let value = serde_json::to_value(value)?;
    let sorted = sort_keys(&value);
    serde_json::to_string(&sorted)
}

/// Hex-encoded SHA-256 of `value`'s canonical JSON form.
///
/// # Errors
/// Propagates serialization errors from [`to_canonical_json`].
pub fn hash_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let canonical = to_canonical_json(value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_canonical_form() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(
            to_canonical_json(&a).expect("serializes"),
            to_canonical_json(&b).expect("serializes")
        );
    }

    #[test]
    fn hash_is_stable_across_key_order() {
        let a = json!({"x": {"z": 1, "y": 2}});
        let b = json!({"x": {"y": 2, "z": 1}});
        assert_eq!(
            hash_json(&a).expect("hashes"),
            hash_json(&b).expect("hashes")
        );
    }

    #[test]
    fn hash_changes_with_content() {
        let a = json!({"a": 1});
        let b = json!({"a": 2});
        assert_ne!(
            hash_json(&a).expect("hashes"),
            hash_json(&b).expect("hashes")
        );
    }
}
