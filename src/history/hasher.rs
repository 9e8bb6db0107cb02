//! SF-014: BLAKE3 digests for plans and step outputs.

use serde_json::Value;

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Hash a JSON value by its compact serialization.
pub fn hash_value(value: &Value) -> String {
    hash_string(&value.to_string())
}
