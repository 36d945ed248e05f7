//! Canonical JSON encoding and the SHA-256 hash chain it feeds (C1).
//!
//! `canonicalize` produces identical byte output for structurally equal
//! `serde_json::Value`s: object keys are sorted by byte value, members whose
//! value is JSON `null` coming from a `#[serde(skip_serializing_if)]` field
//! are simply absent from the `Value` already (serde never emits them), and
//! arrays preserve order. This mirrors spec §4.1 exactly.

use sha2::{Digest, Sha256};

/// Encode `value` as canonical JSON bytes: object keys sorted ascending by
/// byte value, recursively, with array order preserved.
pub fn canonicalize(value: &serde_json::Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut Vec<u8>) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(&serde_json::Value::String((*key).clone()), out);
                out.push(b':');
                write_canonical(&map[*key], out);
            }
            out.push(b'}');
        }
        serde_json::Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        // null, bool, number, string: standard JSON text is already
        // deterministic for a single scalar value.
        other => {
            out.extend_from_slice(other.to_string().as_bytes());
        }
    }
}

/// SHA-256 of arbitrary bytes, lower-case hex encoded.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}

/// `hash(entry) = SHA-256(canonicalize(entry without "hash"))`, for any
/// serializable type. The caller is responsible for ensuring `value` has no
/// `hash` field — `serde_json::to_value` on the audit entry type already
/// omits it via `#[serde(skip_serializing)]` on that field in practice, but
/// this helper also strips a top-level `"hash"` key defensively.
pub fn canonical_hash<T: serde::Serialize>(value: &T) -> String {
    let mut json = serde_json::to_value(value).expect("serialization to Value is infallible");
    if let serde_json::Value::Object(map) = &mut json {
        map.remove("hash");
    }
    sha256_hex(&canonicalize(&json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keys_are_sorted() {
        let a = canonicalize(&json!({"b": 1, "a": 2}));
        let b = canonicalize(&json!({"a": 2, "b": 1}));
        assert_eq!(a, b);
        assert_eq!(String::from_utf8(a).unwrap(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn nested_structures_canonicalize_recursively() {
        let a = canonicalize(&json!({"z": [1, {"y": 1, "x": 2}], "a": null}));
        let expected = r#"{"a":null,"z":[1,{"x":2,"y":1}]}"#;
        assert_eq!(String::from_utf8(a).unwrap(), expected);
    }

    #[test]
    fn array_order_is_preserved() {
        let a = canonicalize(&json!([3, 1, 2]));
        assert_eq!(String::from_utf8(a).unwrap(), "[3,1,2]");
    }

    #[test]
    fn structural_equality_implies_equal_canonicalization() {
        let a = json!({"x": 1, "nested": {"p": true, "q": [1,2,3]}});
        let b = json!({"nested": {"q": [1,2,3], "p": true}, "x": 1});
        assert_eq!(canonicalize(&a), canonicalize(&b));
    }

    #[test]
    fn canonical_hash_excludes_hash_field() {
        #[derive(serde::Serialize)]
        struct Entry {
            sequence: u64,
            hash: String,
        }
        let e1 = Entry { sequence: 1, hash: "aaaa".into() };
        let e2 = Entry { sequence: 1, hash: "bbbb".into() };
        assert_eq!(canonical_hash(&e1), canonical_hash(&e2));
    }
}
