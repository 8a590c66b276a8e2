//! Metadata codec: the single serializer/deserializer used on both sides of
//! the store boundary.
//!
//! Job metadata travels through a JSONB column, and some driver stacks hand
//! byte-array writes back as base64-encoded strings on read. Every write path
//! MUST go through [`encode`] and every read path through [`decode`]; decode
//! unwraps the base64 forms so handlers always observe the mapping the
//! producer submitted, byte for byte.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;

use crate::{QueueError, QueueResult};

/// Stage input/output mapping: string keys to scalar, string or array values.
/// Backed by a sorted map, so [`encode`] output is canonical.
pub type Metadata = serde_json::Map<String, Value>;

/// Encode a metadata mapping to canonical JSON bytes. Keys are emitted only
/// if present; no wrapping, no envelope.
pub fn encode(metadata: &Metadata) -> QueueResult<Vec<u8>> {
    serde_json::to_vec(metadata).map_err(Into::into)
}

/// Decode stored metadata back into a mapping.
///
/// Accepts all three shapes seen in the wild:
/// - raw JSON object bytes (the canonical write),
/// - a JSON string whose content is base64-encoded JSON (driver read-back),
/// - bare base64 text that is not itself valid JSON.
pub fn decode(raw: &[u8]) -> QueueResult<Metadata> {
    match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::String(wrapped)) => decode_base64_json(&wrapped),
        Ok(other) => Err(QueueError::MetadataCodec(format!(
            "expected a JSON object, got {}",
            value_kind(&other)
        ))),
        Err(_) => {
            let text = std::str::from_utf8(raw).map_err(|_| {
                QueueError::MetadataCodec("metadata is neither JSON nor UTF-8".to_string())
            })?;
            decode_base64_json(text.trim())
        }
    }
}

fn decode_base64_json(encoded: &str) -> QueueResult<Metadata> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| QueueError::MetadataCodec(format!("base64 decode failed: {}", e)))?;
    match serde_json::from_slice::<Value>(&bytes)? {
        Value::Object(map) => Ok(map),
        other => Err(QueueError::MetadataCodec(format!(
            "base64 payload is not a JSON object, got {}",
            value_kind(&other)
        ))),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample() -> Metadata {
        let mut map = Metadata::new();
        map.insert("prompt".into(), json!("quarterly review"));
        map.insert("rtl".into(), json!(false));
        map.insert("tags".into(), json!(["finance", "q3"]));
        map
    }

    #[test]
    fn raw_json_round_trips_byte_equivalent() {
        let metadata = sample();
        let bytes = encode(&metadata).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, metadata);
        // Canonical: re-encoding the decoded mapping yields identical bytes
        assert_eq!(encode(&decoded).unwrap(), bytes);
    }

    #[test]
    fn base64_string_read_back_is_unwrapped() {
        let metadata = sample();
        let bytes = encode(&metadata).unwrap();
        // Driver quirk: the column comes back as a JSON string of base64
        let wrapped = serde_json::to_vec(&Value::String(BASE64.encode(&bytes))).unwrap();
        assert_eq!(decode(&wrapped).unwrap(), metadata);
    }

    #[test]
    fn bare_base64_text_is_unwrapped() {
        let metadata = sample();
        let bytes = encode(&metadata).unwrap();
        let bare = BASE64.encode(&bytes).into_bytes();
        assert_eq!(decode(&bare).unwrap(), metadata);
    }

    #[test]
    fn empty_mapping_is_preserved() {
        let empty = Metadata::new();
        let bytes = encode(&empty).unwrap();
        assert_eq!(bytes, b"{}");
        assert_eq!(decode(&bytes).unwrap(), empty);
    }

    #[test]
    fn non_object_json_is_rejected() {
        assert!(decode(b"null").is_err());
        assert!(decode(b"[1,2,3]").is_err());
        assert!(decode(b"42").is_err());
    }

    proptest! {
        // Whatever the mapping, the driver's base64 wrapping never changes
        // what decode returns.
        #[test]
        fn decode_is_wrapping_invariant(entries in proptest::collection::btree_map(
            "[a-z_]{1,12}",
            prop_oneof![
                any::<bool>().prop_map(|b| json!(b)),
                any::<i64>().prop_map(|n| json!(n)),
                "[ -~]{0,24}".prop_map(|s| json!(s)),
                proptest::collection::vec("[ -~]{0,12}", 0..4).prop_map(|v| json!(v)),
            ],
            0..8,
        )) {
            let metadata: Metadata = entries.into_iter().collect();
            let bytes = encode(&metadata).unwrap();
            let wrapped = serde_json::to_vec(&Value::String(BASE64.encode(&bytes))).unwrap();

            prop_assert_eq!(decode(&bytes).unwrap(), metadata.clone());
            prop_assert_eq!(decode(&wrapped).unwrap(), metadata);
        }
    }
}
