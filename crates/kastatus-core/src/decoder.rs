//! Status decoder: turns a raw `getStatus` reply into a [`StatusRecord`].
//!
//! Decoding is strict: every known field is checked against its declared
//! kind, and the only conversion applied is widening an integer into a
//! field declared `double`. Unknown members are kept verbatim.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::record::StatusRecord;
use crate::schema::StatusSchema;
use crate::value::{FieldKind, FieldValue, RpcStruct, RpcValue};

/// Errors decoding a status reply.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed status reply: {0}")]
    MalformedReply(String),

    #[error("status field {field:?} violates schema: {detail}")]
    SchemaViolation { field: String, detail: String },
}

impl DecodeError {
    /// The offending field, for schema violations.
    pub fn field(&self) -> Option<&str> {
        match self {
            DecodeError::SchemaViolation { field, .. } => Some(field),
            DecodeError::MalformedReply(_) => None,
        }
    }

    fn violation(field: &str, detail: impl Into<String>) -> Self {
        DecodeError::SchemaViolation {
            field: field.to_string(),
            detail: detail.into(),
        }
    }
}

/// Decode `reply` against `schema`, stamping it with the current time.
pub fn decode(reply: &RpcValue, schema: &StatusSchema) -> Result<StatusRecord, DecodeError> {
    decode_at(reply, schema, Utc::now())
}

/// Decode `reply` against `schema` as if it arrived at `fetched_at`.
pub fn decode_at(
    reply: &RpcValue,
    schema: &StatusSchema,
    fetched_at: DateTime<Utc>,
) -> Result<StatusRecord, DecodeError> {
    let members = reply.as_struct().ok_or_else(|| {
        DecodeError::MalformedReply(format!("expected a struct, got {}", reply.type_name()))
    })?;

    let mut fields = BTreeMap::new();
    for spec in schema.fields {
        match members.get(spec.name) {
            Some(raw) => {
                fields.insert(spec.name.to_string(), convert(spec.name, spec.kind, raw)?);
            }
            None if spec.required => {
                return Err(DecodeError::violation(spec.name, "required field is missing"));
            }
            None => {}
        }
    }

    let timestamp = match schema.timestamp_field {
        Some(name) => match members.get(name) {
            Some(raw) => timestamp_from(name, raw)?,
            None => fetched_at,
        },
        None => fetched_at,
    };

    let unrecognized: RpcStruct = members
        .iter()
        .filter(|(name, _)| !schema.is_known(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    if !unrecognized.is_empty() {
        tracing::debug!(
            schema = schema.name,
            count = unrecognized.len(),
            "Status reply carries unrecognized fields"
        );
    }

    Ok(StatusRecord::new(timestamp, fetched_at, fields, unrecognized))
}

fn convert(name: &str, kind: FieldKind, raw: &RpcValue) -> Result<FieldValue, DecodeError> {
    match (kind, raw) {
        (FieldKind::Bool, RpcValue::Bool(v)) => Ok(FieldValue::Bool(*v)),
        (FieldKind::Int, RpcValue::Int(v)) => Ok(FieldValue::Int(*v)),
        (FieldKind::Double, RpcValue::Double(v)) => Ok(FieldValue::Double(*v)),
        (FieldKind::Double, RpcValue::Int(v)) => Ok(FieldValue::Double(*v as f64)),
        (FieldKind::String, RpcValue::String(v)) => Ok(FieldValue::String(v.clone())),
        _ => Err(DecodeError::violation(
            name,
            format!("expected {kind}, got {}", raw.type_name()),
        )),
    }
}

fn timestamp_from(name: &str, raw: &RpcValue) -> Result<DateTime<Utc>, DecodeError> {
    let parsed = match raw {
        RpcValue::DateTime(t) => Some(*t),
        RpcValue::Int(secs) => DateTime::from_timestamp(*secs, 0),
        RpcValue::Double(secs) if secs.is_finite() => {
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9).round() as u32;
            DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
        }
        _ => {
            return Err(DecodeError::violation(
                name,
                format!("expected a timestamp, got {}", raw.type_name()),
            ));
        }
    };
    parsed.ok_or_else(|| DecodeError::violation(name, "timestamp out of range"))
}
