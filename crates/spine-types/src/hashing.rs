//! Canonical serialization and content hashing.
//!
//! Every document that carries a content-derived identifier (contracts,
//! events, intents) is hashed the same way: serialize to JSON, canonicalize
//! with RFC 8785 (sorted keys, normalized numbers), then SHA-256 over the
//! UTF-8 bytes, rendered as lowercase hex.
//!
//! # Example
//!
//! ```
//! use spine_types::hashing::{canonical_json, sha256_hex};
//! use serde_json::json;
//!
//! let a = canonical_json(&json!({"b": 1, "a": 2})).unwrap();
//! assert_eq!(a, r#"{"a":2,"b":1}"#);
//! assert_eq!(sha256_hex(b"").len(), 64);
//! ```

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::SpineError;

/// Render `value` as RFC 8785 canonical JSON.
///
/// # Errors
///
/// [`SpineError::Serialization`] when the value fails to serialize.
/// Non-finite floats are written as `null`, so callers hashing numeric
/// input reject NaN and infinity before calling this.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, SpineError> {
    serde_jcs::to_string(value).map_err(|e| SpineError::Serialization(e.to_string()))
}

/// SHA-256 of `bytes` as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{digest:x}")
}

/// Hash the canonical JSON form of `value`.
///
/// # Errors
///
/// Propagates [`canonical_json`] failures.
pub fn hash_canonical<T: Serialize + ?Sized>(value: &T) -> Result<String, SpineError> {
    Ok(sha256_hex(canonical_json(value)?.as_bytes()))
}

/// Content hash of `value` with the top-level `id_field` removed.
///
/// Used for self-identifying documents whose identifier is derived from
/// every other field.  The id field may hold any placeholder when this is
/// called; it never contributes to the hash.
///
/// # Errors
///
/// [`SpineError::Serialization`] when `value` does not serialize to a JSON
/// object.
pub fn content_id<T: Serialize>(value: &T, id_field: &str) -> Result<String, SpineError> {
    let mut json = serde_json::to_value(value).map_err(|e| SpineError::Serialization(e.to_string()))?;
    match json {
        Value::Object(ref mut map) => {
            map.remove(id_field);
        }
        _ => {
            return Err(SpineError::Serialization(format!(
                "content id requires a JSON object (field `{id_field}`)"
            )));
        }
    }
    hash_canonical(&json)
}
