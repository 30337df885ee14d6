//! Canonical JSON and content hashing (spec §4.5.4, §6.3).
//!
//! Canonicalization sorts object keys lexicographically at every level and
//! preserves array order. The hash is SHA-256 of the UTF-8 bytes of the
//! canonical JSON, hex-encoded. `serde_json::Value::Object` here is backed
//! by a `BTreeMap` (no `preserve_order` feature enabled on `serde_json`),
//! so keys already iterate sorted; this function makes that explicit and
//! recursive rather than relying on it implicitly.

use serde_json::Value;
use sha2::{Digest, Sha256};

pub fn canonicalize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                sorted.insert(key.clone(), canonicalize_json(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize_json).collect()),
        other => other.clone(),
    }
}

pub fn hash_canonical(value: &Value) -> String {
    let canonical = canonicalize_json(value);
    let bytes = serde_json::to_vec(&canonical).expect("canonical json always serializes");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonicalize_sorts_keys_at_every_level() {
        let input = json!({"b": 1, "a": {"z": 1, "y": 2}});
        let canonical = canonicalize_json(&input);
        let rendered = serde_json::to_string(&canonical).unwrap();
        assert_eq!(rendered, r#"{"a":{"y":2,"z":1},"b":1}"#);
    }

    #[test]
    fn test_canonicalize_preserves_array_order() {
        let input = json!({"xs": [3, 1, 2]});
        let canonical = canonicalize_json(&input);
        assert_eq!(canonical["xs"], json!([3, 1, 2]));
    }

    #[test]
    fn test_hash_roundtrip_is_stable() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(hash_canonical(&a), hash_canonical(&b));
    }

    #[test]
    fn test_parse_stringify_roundtrip_preserves_hash() {
        let value = json!({"rankings": [{"user_id": "u1", "rank": 1, "score": 100}]});
        let stringified = serde_json::to_string(&value).unwrap();
        let reparsed: Value = serde_json::from_str(&stringified).unwrap();
        assert_eq!(hash_canonical(&value), hash_canonical(&reparsed));
    }
}
