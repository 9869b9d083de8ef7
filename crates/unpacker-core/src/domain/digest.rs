//! Canonical JSON normalization and digest computation (RFC 8785-class).
//!
//! Provenance entries identify prompts and model outputs by the SHA-256 of
//! their canonical JSON form, so two backends returning the same object with
//! different key order or `1.0` vs `1` still produce the same digest.

use crate::domain::error::{Result, UnpackerError};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Recursively sort JSON object keys using UTF-16 code unit ordering (RFC 8785 §3.2.3).
fn sort_keys_utf16(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));

            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(v) = map.get(key) {
                    sorted.insert(key.to_string(), sort_keys_utf16(v));
                }
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(sort_keys_utf16).collect())
        }
        other => other.clone(),
    }
}

/// Normalize numbers: integer-valued floats become integers; NaN/Infinity are rejected.
fn normalize_value(value: &serde_json::Value) -> Result<serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => {
            let mut normalized = serde_json::Map::new();
            for (k, v) in map {
                normalized.insert(k.clone(), normalize_value(v)?);
            }
            Ok(serde_json::Value::Object(normalized))
        }
        serde_json::Value::Array(arr) => Ok(serde_json::Value::Array(
            arr.iter().map(normalize_value).collect::<Result<Vec<_>>>()?,
        )),
        serde_json::Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                return Ok(serde_json::Value::Number(n.clone()));
            }
            match n.as_f64() {
                Some(f) if !f.is_finite() => Err(UnpackerError::NonCanonical(
                    "NaN/Infinity not permitted in canonical JSON".to_string(),
                )),
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                    Ok(serde_json::Value::Number(serde_json::Number::from(f as i64)))
                }
                _ => Ok(serde_json::Value::Number(n.clone())),
            }
        }
        other => Ok(other.clone()),
    }
}

/// Convert a JSON value to canonical form: normalize numbers, sort keys, compact output.
pub fn canonical_json(value: &serde_json::Value) -> Result<String> {
    let normalized = normalize_value(value)?;
    Ok(serde_json::to_string(&sort_keys_utf16(&normalized))?)
}

/// Compute the SHA-256 hex digest of a value's canonical JSON.
pub fn compute_digest(value: &serde_json::Value) -> Result<String> {
    let canonical = canonical_json(value)?;
    Ok(digest_bytes(canonical.as_bytes()))
}

/// Digest any serializable value via its canonical JSON.
pub fn digest_of<T: Serialize>(value: &T) -> Result<String> {
    compute_digest(&serde_json::to_value(value)?)
}

/// SHA-256 hex digest of raw bytes.
pub fn digest_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_json_integer_float() {
        let input = serde_json::json!({ "score": 72.0 });
        assert_eq!(canonical_json(&input).unwrap(), r#"{"score":72}"#);
    }

    #[test]
    fn test_canonical_json_fractional_float() {
        let input = serde_json::json!({ "score": 72.5 });
        assert_eq!(canonical_json(&input).unwrap(), r#"{"score":72.5}"#);
    }

    #[test]
    fn test_canonical_json_field_order_invariant() {
        let a = serde_json::json!({ "rationale": "fresh", "score": 40, "nested": { "z": 1, "a": 2 } });
        let b = serde_json::json!({ "nested": { "a": 2, "z": 1 }, "score": 40.0, "rationale": "fresh" });
        assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
    }

    #[test]
    fn test_canonical_json_array_order_preserved() {
        let a = serde_json::json!({ "feedback": ["tighten", "cut"] });
        let b = serde_json::json!({ "feedback": ["cut", "tighten"] });
        assert_ne!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
    }

    #[test]
    fn test_compute_digest_shape_and_determinism() {
        let input = serde_json::json!({ "task": "score_idea", "idea": "idea-0" });
        let d1 = compute_digest(&input).unwrap();
        let d2 = compute_digest(&input).unwrap();
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 64);
        assert!(d1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_digest_of_matches_compute_digest() {
        #[derive(Serialize)]
        struct Scored {
            score: f64,
        }
        let via_struct = digest_of(&Scored { score: 90.0 }).unwrap();
        let via_value = compute_digest(&serde_json::json!({ "score": 90 })).unwrap();
        assert_eq!(via_struct, via_value);
    }
}
