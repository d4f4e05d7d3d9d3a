//! Canonical JSON digests for snapshots.
//!
//! Object keys are sorted recursively, arrays keep their order, and the
//! compact encoding is hashed with SHA-256.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest as _, Sha256};

/// Canonicalization scheme name recorded next to every digest.
pub const CANON_COWRITE_V1: &str = "cowrite-canon-v1";

/// Algorithm + canonicalization scheme + lowercase hex value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Digest {
    pub alg: String,
    pub canon: String,
    pub value: String,
}

impl Digest {
    pub fn sha256(value: String) -> Self {
        Self {
            alg: "sha256".to_string(),
            canon: CANON_COWRITE_V1.to_string(),
            value,
        }
    }
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let out: serde_json::Map<String, Value> = keys
                .into_iter()
                .map(|k| (k.clone(), sorted(&map[k])))
                .collect();
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Compact JSON bytes with object keys sorted at every depth.
pub fn canonical_json_bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(&sorted(value)).expect("serializing a JSON value should not fail")
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Digest any serializable value through its canonical JSON form.
pub fn digest_of<T: Serialize>(value: &T) -> anyhow::Result<Digest> {
    let json = serde_json::to_value(value)?;
    Ok(Digest::sha256(sha256_hex(&canonical_json_bytes(&json))))
}

/// Recompute the digest of `value` and compare it with `expected`.
pub fn verify<T: Serialize>(value: &T, expected: &Digest) -> anyhow::Result<bool> {
    if expected.alg != "sha256" || expected.canon != CANON_COWRITE_V1 {
        return Ok(false);
    }
    Ok(digest_of(value)?.value == expected.value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_order_does_not_change_digest() {
        let a: Value = serde_json::from_str(r#"{"b":{"y":1,"x":2},"a":[3,1]}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":[3,1],"b":{"x":2,"y":1}}"#).unwrap();
        assert_eq!(digest_of(&a).unwrap(), digest_of(&b).unwrap());
        assert_eq!(
            String::from_utf8(canonical_json_bytes(&a)).unwrap(),
            r#"{"a":[3,1],"b":{"x":2,"y":1}}"#
        );
    }

    #[test]
    fn array_order_changes_digest() {
        let a = serde_json::json!({"rounds": ["r-1", "r-2"]});
        let b = serde_json::json!({"rounds": ["r-2", "r-1"]});
        assert_ne!(digest_of(&a).unwrap(), digest_of(&b).unwrap());
    }

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn verify_detects_tampering() {
        let original = serde_json::json!({"goal": "essay", "counter": 3});
        let digest = digest_of(&original).unwrap();
        assert!(verify(&original, &digest).unwrap());

        let tampered = serde_json::json!({"goal": "essay", "counter": 4});
        assert!(!verify(&tampered, &digest).unwrap());

        let foreign = Digest {
            alg: "md5".into(),
            ..digest
        };
        assert!(!verify(&original, &foreign).unwrap());
    }
}
