//! Payload integrity: HMAC-SHA256 over a canonical metadata stringification.
//!
//! Canonical form sorts object keys recursively and preserves array order, so
//! the MAC is stable across serializer implementations. Comparison is
//! constant-time.

use crate::metadata::VectorMetadata;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug)]
pub enum MacError {
    #[error("metadata serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid MAC key")]
    InvalidKey,
}

/// Serializes a JSON value with object keys sorted recursively.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Computes the hex-encoded payload MAC for a metadata value.
pub fn metadata_mac(secret: &[u8], metadata: &VectorMetadata) -> Result<String, MacError> {
    let value = serde_json::to_value(metadata)?;
    let canonical = canonical_json(&value);
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| MacError::InvalidKey)?;
    mac.update(canonical.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time verification of a stored hex MAC against the recomputed one.
pub fn verify_metadata_mac(secret: &[u8], metadata: &VectorMetadata, expected_hex: &str) -> bool {
    let Ok(actual) = metadata_mac(secret, metadata) else {
        return false;
    };
    actual.as_bytes().ct_eq(expected_hex.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VectorMetadata {
        serde_json::from_value(serde_json::json!({
            "sourcePdfKey": "documents/original/src.pdf",
            "ticketCrop": {
                "pageIndex": 0, "xRatio": 0.1, "yRatio": 0.1,
                "widthRatio": 0.5, "heightRatio": 0.4
            },
            "layout": { "pageSize": "A4", "totalPages": 2, "repeatPerPage": 1 }
        }))
        .unwrap()
    }

    #[test]
    fn canonical_json_sorts_keys_recursively() {
        let value = serde_json::json!({
            "b": { "z": 1, "a": [ { "y": 2, "x": 3 } ] },
            "a": "text"
        });
        assert_eq!(
            canonical_json(&value),
            r#"{"a":"text","b":{"a":[{"x":3,"y":2}],"z":1}}"#
        );
    }

    #[test]
    fn mac_is_stable_and_verifies() {
        let secret = b"test-secret";
        let meta = sample();
        let mac1 = metadata_mac(secret, &meta).unwrap();
        let mac2 = metadata_mac(secret, &meta).unwrap();
        assert_eq!(mac1, mac2);
        assert!(verify_metadata_mac(secret, &meta, &mac1));
    }

    #[test]
    fn mac_rejects_tampered_metadata() {
        let secret = b"test-secret";
        let meta = sample();
        let mac = metadata_mac(secret, &meta).unwrap();

        let mut tampered = meta.clone();
        tampered.layout.total_pages = 3;
        assert!(!verify_metadata_mac(secret, &tampered, &mac));
        assert!(!verify_metadata_mac(b"other-secret", &meta, &mac));
    }
}
