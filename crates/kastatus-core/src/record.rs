//! Immutable snapshot of daemon-reported status.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::schema::StatusSchema;
use crate::value::{FieldKind, FieldValue, FromField, RpcStruct, RpcValue};

/// Errors reading a field from a [`StatusRecord`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("status field {0:?} is missing")]
    FieldMissing(String),

    #[error("status field {field:?} holds a {found}, not a {expected}")]
    FieldTypeMismatch {
        field: String,
        expected: FieldKind,
        found: FieldKind,
    },

    #[error("status field {field:?} value {value} is out of range")]
    OutOfRange { field: String, value: i64 },
}

/// One snapshot of daemon state, produced by a single completed RPC
/// round-trip.
///
/// `fetched_at_utc >= timestamp_utc` is expected but not enforced; use
/// [`clock_skew`](Self::clock_skew) to monitor it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusRecord {
    timestamp_utc: DateTime<Utc>,
    fetched_at_utc: DateTime<Utc>,
    fields: BTreeMap<String, FieldValue>,
    raw_unrecognized_fields: RpcStruct,
}

impl StatusRecord {
    pub fn new(
        timestamp_utc: DateTime<Utc>,
        fetched_at_utc: DateTime<Utc>,
        fields: BTreeMap<String, FieldValue>,
        raw_unrecognized_fields: RpcStruct,
    ) -> Self {
        Self {
            timestamp_utc,
            fetched_at_utc,
            fields,
            raw_unrecognized_fields,
        }
    }

    /// When the daemon produced the snapshot.
    pub fn timestamp_utc(&self) -> DateTime<Utc> {
        self.timestamp_utc
    }

    /// When this client received the reply (local clock).
    pub fn fetched_at_utc(&self) -> DateTime<Utc> {
        self.fetched_at_utc
    }

    /// All known-schema fields present in the reply.
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Reply members that are not part of the known schema, verbatim.
    pub fn raw_unrecognized_fields(&self) -> &RpcStruct {
        &self.raw_unrecognized_fields
    }

    /// The raw stored value of a field, if present.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Read a field as `T`.
    pub fn get<T: FromField>(&self, name: &str) -> Result<T, FieldError> {
        self.get_opt(name)?
            .ok_or_else(|| FieldError::FieldMissing(name.to_string()))
    }

    /// Read a field as `T`, returning `None` if it is absent.
    ///
    /// A present field of the wrong type is still an error.
    pub fn get_opt<T: FromField>(&self, name: &str) -> Result<Option<T>, FieldError> {
        let Some(value) = self.fields.get(name) else {
            return Ok(None);
        };
        T::from_field(value)
            .map(Some)
            .ok_or_else(|| FieldError::FieldTypeMismatch {
                field: name.to_string(),
                expected: T::KIND,
                found: value.kind(),
            })
    }

    /// Time elapsed between receipt of this snapshot and `now`.
    pub fn age_at(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.fetched_at_utc
    }

    /// Whether the daemon's own timestamp is older than `threshold` at
    /// `now`. A freshly fetched record can still carry stale data.
    pub fn is_stale_at(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        match TimeDelta::from_std(threshold) {
            Ok(threshold) => now - self.timestamp_utc > threshold,
            Err(_) => false,
        }
    }

    /// Local receipt time minus daemon timestamp. Positive when the daemon's
    /// clock lags ours (or the reply was in flight); negative means skew.
    pub fn clock_skew(&self) -> TimeDelta {
        self.fetched_at_utc - self.timestamp_utc
    }

    /// Re-encode this record as the reply struct a daemon would send.
    ///
    /// Decoding the result against `schema` reproduces the known fields.
    pub fn to_reply(&self, schema: &StatusSchema) -> RpcValue {
        let mut members = self.raw_unrecognized_fields.clone();
        for (name, value) in &self.fields {
            members.insert(name.clone(), RpcValue::from(value.clone()));
        }
        if let Some(field) = schema.timestamp_field {
            members.insert(field.to_string(), RpcValue::DateTime(self.timestamp_utc));
        }
        RpcValue::Struct(members)
    }
}
