//! Canonical CBOR encoding for event digests.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! The canonical encoding is critical: the same event fields must produce
//! identical bytes (and thus identical digests) on every platform.

use ciborium::value::Value;

use crate::error::CoreError;
use crate::payload::EventPayload;
use crate::types::{EventHash, ProductId, UserId};

/// Event field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const PRODUCT_ID: u64 = 0;
    pub const SEQ: u64 = 1;
    pub const EVENT_TYPE: u64 = 2;
    pub const EVENT_DATA: u64 = 3;
    pub const CREATED_BY: u64 = 4;
    pub const CREATED_AT: u64 = 5;
    pub const PREVIOUS_EVENT_HASH: u64 = 6;
}

/// The fields covered by an event digest.
#[derive(Debug, Clone, Copy)]
pub struct DigestInput<'a> {
    pub product_id: ProductId,
    pub seq: u64,
    pub payload: &'a EventPayload,
    pub created_by: UserId,
    pub created_at: i64,
    pub previous_event_hash: &'a EventHash,
}

/// Encode the digest input to canonical CBOR bytes.
pub fn canonical_event_bytes(input: &DigestInput<'_>) -> Result<Vec<u8>, CoreError> {
    let value = event_to_cbor_value(input);
    encode_cbor_value_canonical(&value)
}

/// Convert the digest input to a CBOR Value (map with integer keys).
fn event_to_cbor_value(input: &DigestInput<'_>) -> Value {
    let entries = vec![
        (
            Value::Integer(keys::PRODUCT_ID.into()),
            Value::Integer(input.product_id.get().into()),
        ),
        (Value::Integer(keys::SEQ.into()), Value::Integer(input.seq.into())),
        (
            Value::Integer(keys::EVENT_TYPE.into()),
            Value::Text(input.payload.event_type().as_str().to_string()),
        ),
        (
            Value::Integer(keys::EVENT_DATA.into()),
            payload_to_cbor_value(input.payload),
        ),
        (
            Value::Integer(keys::CREATED_BY.into()),
            Value::Integer(input.created_by.get().into()),
        ),
        (
            Value::Integer(keys::CREATED_AT.into()),
            Value::Integer(input.created_at.into()),
        ),
        (
            Value::Integer(keys::PREVIOUS_EVENT_HASH.into()),
            Value::Bytes(input.previous_event_hash.0.to_vec()),
        ),
    ];

    Value::Map(entries)
}

/// Convert a payload to a text-keyed CBOR map. Absent optional fields are omitted.
fn payload_to_cbor_value(payload: &EventPayload) -> Value {
    let text = |k: &str, v: &str| (Value::Text(k.to_string()), Value::Text(v.to_string()));

    let entries = match payload {
        EventPayload::Registration { details } => vec![text("details", details)],
        EventPayload::OwnershipTransfer { new_owner_id } => vec![(
            Value::Text("new_owner_id".to_string()),
            Value::Integer(new_owner_id.get().into()),
        )],
        EventPayload::Repair {
            repair_details,
            parts_used,
        } => {
            let mut entries = vec![text("repair_details", repair_details)];
            if let Some(parts) = parts_used {
                entries.push(text("parts_used", parts));
            }
            entries
        }
        EventPayload::Inspection { inspection_details } => {
            vec![text("inspection_details", inspection_details)]
        }
        EventPayload::Maintenance {
            maintenance_details,
        } => vec![text("maintenance_details", maintenance_details)],
        EventPayload::SoftwareUpdate { details } | EventPayload::Custom { details } => {
            vec![text("details", details)]
        }
    };

    Value::Map(entries)
}

/// Encode a CBOR Value to canonical bytes.
fn encode_cbor_value_canonical(value: &Value) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value)?;
    Ok(buf)
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) -> Result<(), CoreError> {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => encode_array(buf, arr)?,
        Value::Map(entries) => encode_map_canonical(buf, entries)?,
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Float(_) => {
            return Err(CoreError::EncodingError(
                "floats not supported in canonical encoding".into(),
            ))
        }
        _ => return Err(CoreError::EncodingError("unsupported CBOR value type".into())),
    }
    Ok(())
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffffffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode an array (major type 4).
fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) -> Result<(), CoreError> {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item)?;
    }
    Ok(())
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) -> Result<(), CoreError> {
    let mut pairs: Vec<(Vec<u8>, &Value)> = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        let mut key_buf = Vec::new();
        encode_value_to(&mut key_buf, k)?;
        pairs.push((key_buf, v));
    }

    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value)?;
    }
    Ok(())
}
