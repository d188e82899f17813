//! Canonical JSON codec.
//!
//! Every signed entity and every anchored hash in this crate is computed
//! over the same deterministic byte sequence: recursively NFC-normalize
//! strings, sort object keys by Unicode code point, and emit compact JSON
//! with non-ASCII left untouched. Two semantically equal values that differ
//! only in key order or Unicode normalization form must canonicalize to the
//! same bytes.

use crate::error::{KernelError, Result};
use serde::Serialize;
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

/// Recursively NFC-normalize every string in a JSON value.
fn normalize(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.nfc().collect()),
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.nfc().collect(), normalize(v));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Serialize a JSON value into canonical bytes: NFC-normalized, sorted
/// keys, no whitespace, UTF-8, non-ASCII retained literally.
///
/// `serde_json::Value`'s `Object` is backed by a `BTreeMap` when the
/// `preserve_order` feature is disabled, so keys come out of `serde_json`
/// already sorted lexicographically by UTF-8 byte value, which coincides
/// with Unicode code-point order for the key strings this crate signs.
pub fn canonicalize_value(value: &Value) -> Result<Vec<u8>> {
    if has_non_finite(value) {
        return Err(KernelError::Internal(
            "canonical encoding rejects NaN/Infinity leaves".into(),
        ));
    }
    let normalized = normalize(value);
    serde_json::to_vec(&normalized).map_err(KernelError::from)
}

/// Canonicalize any serializable value by round-tripping it through
/// `serde_json::Value` first.
pub fn canonicalize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let as_value = serde_json::to_value(value).map_err(KernelError::from)?;
    canonicalize_value(&as_value)
}

fn has_non_finite(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_f64().map(|f| !f.is_finite()).unwrap_or(false),
        Value::Array(items) => items.iter().any(has_non_finite),
        Value::Object(map) => map.values().any(has_non_finite),
        _ => false,
    }
}
