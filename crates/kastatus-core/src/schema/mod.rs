//! Status reply schemas, the wire contract between this client and a
//! daemon's `getStatus` method.
//!
//! A schema is a static table of field names and declared types. It is
//! append-only: daemons may add fields (they land in the record's
//! unrecognized map) but must not change the type of an existing one.

pub mod kadrx;
pub mod xmitd;

use crate::value::FieldKind;

pub use kadrx::{KADRX_SCHEMA, KadrxStatus, NoXmitBitmap, NoXmitReason};
pub use xmitd::{XMITD_SCHEMA, XmitdStatus, XmitterFault};

/// One field of a status reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// A reply lacking a required field is rejected.
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// The known fields of one daemon's status reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSchema {
    /// Daemon name, for logs.
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
    /// Reply member carrying the daemon's own snapshot time, if any.
    pub timestamp_field: Option<&'static str>,
}

impl StatusSchema {
    pub const fn new(name: &'static str, fields: &'static [FieldSpec]) -> Self {
        Self {
            name,
            fields,
            timestamp_field: None,
        }
    }

    pub const fn with_timestamp_field(self, field: &'static str) -> Self {
        Self {
            timestamp_field: Some(field),
            ..self
        }
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether `name` is part of this schema (a field or the timestamp).
    pub fn is_known(&self, name: &str) -> bool {
        self.timestamp_field == Some(name) || self.field(name).is_some()
    }
}
