//! Dynamic RPC values and the typed scalars a status record stores.
//!
//! [`RpcValue`] mirrors the XML-RPC data model: whatever the daemon sends
//! is representable without loss. [`FieldValue`] is the narrower scalar
//! set a decoded status field may hold.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// An XML-RPC `<struct>`: member name to value.
pub type RpcStruct = BTreeMap<String, RpcValue>;

/// A dynamically-typed value as carried by the RPC transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RpcValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Base64(Vec<u8>),
    Array(Vec<RpcValue>),
    Struct(RpcStruct),
    Nil,
}

impl RpcValue {
    /// The XML-RPC type name of this value, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            RpcValue::Bool(_) => "boolean",
            RpcValue::Int(_) => "int",
            RpcValue::Double(_) => "double",
            RpcValue::String(_) => "string",
            RpcValue::DateTime(_) => "dateTime.iso8601",
            RpcValue::Base64(_) => "base64",
            RpcValue::Array(_) => "array",
            RpcValue::Struct(_) => "struct",
            RpcValue::Nil => "nil",
        }
    }

    /// Borrow the members if this value is a struct.
    pub fn as_struct(&self) -> Option<&RpcStruct> {
        match self {
            RpcValue::Struct(members) => Some(members),
            _ => None,
        }
    }
}

impl From<bool> for RpcValue {
    fn from(v: bool) -> Self {
        RpcValue::Bool(v)
    }
}

impl From<i32> for RpcValue {
    fn from(v: i32) -> Self {
        RpcValue::Int(i64::from(v))
    }
}

impl From<i64> for RpcValue {
    fn from(v: i64) -> Self {
        RpcValue::Int(v)
    }
}

impl From<f64> for RpcValue {
    fn from(v: f64) -> Self {
        RpcValue::Double(v)
    }
}

impl From<&str> for RpcValue {
    fn from(v: &str) -> Self {
        RpcValue::String(v.to_string())
    }
}

impl From<String> for RpcValue {
    fn from(v: String) -> Self {
        RpcValue::String(v)
    }
}

impl From<DateTime<Utc>> for RpcValue {
    fn from(v: DateTime<Utc>) -> Self {
        RpcValue::DateTime(v)
    }
}

impl From<RpcStruct> for RpcValue {
    fn from(v: RpcStruct) -> Self {
        RpcValue::Struct(v)
    }
}

/// Declared type of a status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    Int,
    Double,
    String,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Bool => "bool",
            FieldKind::Int => "int",
            FieldKind::Double => "double",
            FieldKind::String => "string",
        };
        f.write_str(name)
    }
}

/// A typed scalar held by a decoded status record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

impl FieldValue {
    /// The kind of scalar stored.
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::Int(_) => FieldKind::Int,
            FieldValue::Double(_) => FieldKind::Double,
            FieldValue::String(_) => FieldKind::String,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Double(v) => write!(f, "{v}"),
            FieldValue::String(v) => f.write_str(v),
        }
    }
}

impl From<FieldValue> for RpcValue {
    fn from(v: FieldValue) -> Self {
        match v {
            FieldValue::Bool(b) => RpcValue::Bool(b),
            FieldValue::Int(i) => RpcValue::Int(i),
            FieldValue::Double(d) => RpcValue::Double(d),
            FieldValue::String(s) => RpcValue::String(s),
        }
    }
}

/// Rust types a [`FieldValue`] can be read back as.
pub trait FromField: Sized {
    /// The field kind this type corresponds to.
    const KIND: FieldKind;

    /// Extract the value, or `None` if the stored kind differs.
    fn from_field(value: &FieldValue) -> Option<Self>;
}

impl FromField for bool {
    const KIND: FieldKind = FieldKind::Bool;

    fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromField for i64 {
    const KIND: FieldKind = FieldKind::Int;

    fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromField for f64 {
    const KIND: FieldKind = FieldKind::Double;

    fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromField for String {
    const KIND: FieldKind = FieldKind::String;

    fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::String(v) => Some(v.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(RpcValue::from(true).type_name(), "boolean");
        assert_eq!(RpcValue::from(3).type_name(), "int");
        assert_eq!(RpcValue::Nil.type_name(), "nil");
        assert_eq!(RpcValue::Struct(RpcStruct::new()).type_name(), "struct");
    }

    #[test]
    fn test_from_field_checks_kind() {
        let v = FieldValue::Int(7);
        assert_eq!(i64::from_field(&v), Some(7));
        assert_eq!(f64::from_field(&v), None);
        assert_eq!(bool::from_field(&v), None);
    }

    #[test]
    fn test_field_value_into_rpc_value() {
        assert_eq!(
            RpcValue::from(FieldValue::String("on".to_string())),
            RpcValue::String("on".to_string())
        );
        assert_eq!(RpcValue::from(FieldValue::Double(1.5)), RpcValue::Double(1.5));
    }

    #[test]
    fn test_field_value_serializes_untagged() {
        let json = serde_json::to_string(&FieldValue::Bool(true)).unwrap();
        assert_eq!(json, "true");
        let json = serde_json::to_string(&RpcValue::Nil).unwrap();
        assert_eq!(json, "null");
    }
}
