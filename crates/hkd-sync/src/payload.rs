//! # Remote Payload Shaping
//!
//! Normalization and stamping applied to every outbound payload, plus the
//! metadata reader used by the merge policy on inbound values.
//!
//! ## Rules
//! - The remote store rejects null/undefined values: nulls are normalized to
//!   empty strings before transmission.
//! - Every outbound write carries a `lastUpdated` stamp and a `_syncedAt`
//!   marker. `lastUpdated` is set at *mutation* time and preserved here -
//!   re-stamping at push time would let a late push win conflicts it lost.
//! - The local-only `_synced` marker never goes on the wire.

use serde_json::{json, Map, Value};

use hkd_core::RecordMeta;

/// Recursively replaces JSON nulls with empty strings.
///
/// Our own serializers skip absent fields, so this mostly guards payloads
/// assembled from foreign data (imports, older devices).
pub fn normalize(value: &mut Value) {
    match value {
        Value::Null => *value = Value::String(String::new()),
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                normalize(v);
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                normalize(v);
            }
        }
        _ => {}
    }
}

/// Prepares an entity payload for a remote write: normalizes nulls, strips
/// local bookkeeping, stamps `_syncedAt`, and backfills `lastUpdated` only
/// if the mutation forgot it.
pub fn outbound(mut value: Value, now: i64) -> Value {
    normalize(&mut value);

    if let Value::Object(map) = &mut value {
        map.remove("_synced");
        map.insert("_syncedAt".to_string(), json!(now));
        map.entry("lastUpdated".to_string()).or_insert(json!(now));
    }

    value
}

/// Builds the soft-delete payload written in place of a removal, so devices
/// pulling by watermark still observe the deletion event.
pub fn tombstone(deleted_at: i64) -> Value {
    json!({
        "_deleted": true,
        "_deletedAt": deleted_at,
        "lastUpdated": deleted_at,
    })
}

/// Reads the merge-relevant metadata from a remote value.
pub fn record_meta(value: &Value) -> RecordMeta {
    RecordMeta {
        last_updated: value
            .get("lastUpdated")
            .and_then(Value::as_i64)
            .unwrap_or(0),
        deleted: value
            .get("_deleted")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    }
}

/// The stamp used for watermark filtering during pulls: whichever is later
/// of the mutation time and the push time.
///
/// Filtering on `lastUpdated` alone would lose records that were mutated
/// long ago offline but pushed only recently; `_syncedAt` catches those.
/// Re-considering a record is harmless - the merge apply is idempotent.
pub fn sync_stamp(value: &Value) -> i64 {
    let pushed_at = value.get("_syncedAt").and_then(Value::as_i64).unwrap_or(0);
    record_meta(value).last_updated.max(pushed_at)
}

/// Reads the tombstone age stamp, falling back to `lastUpdated`.
pub fn deleted_at(value: &Value) -> i64 {
    value
        .get("_deletedAt")
        .and_then(Value::as_i64)
        .unwrap_or_else(|| record_meta(value).last_updated)
}

/// Returns the object-valued children of a node. In the nested layout a
/// category node's scalar fields describe the category itself and every
/// object child is a product.
pub fn object_children(value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| v.is_object())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Returns the node with its object-valued children removed - the scalar
/// fields of a nested category node.
pub fn scalar_fields(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let scalars: Map<String, Value> = map
                .iter()
                .filter(|(_, v)| !v.is_object())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Value::Object(scalars)
        }
        other => other.clone(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
