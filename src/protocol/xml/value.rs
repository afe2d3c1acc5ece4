//! The tagged value grammar exchanged on the wire.
//!
//! [`Value`] is the closed set of shapes a `<value>` element can take. It is
//! what the parser produces, what the type-driven decoders consume, and it
//! doubles as the dynamic ("any") host type: decoding into a `Value` keeps
//! whatever arrived, with structs materialized as name-ordered maps.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};

/// A single XML-RPC value.
///
/// `Struct` members are keyed by name. When the wire repeats a name, the last
/// occurrence wins, and an empty `<struct></struct>` is an empty map rather
/// than an absent one.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// `<value/>` or an empty scalar leaf; decodes to the destination's zero value
    #[default]
    Nil,
    /// `<int>` / `<i4>`
    Int(i64),
    /// `<i8>`, only accepted by 64-bit integer destinations
    I8(i64),
    /// Unsigned integer, written with the `<i4>` tag
    UnsignedInt(u64),
    /// `<boolean>` holding `0` or `1`
    Boolean(bool),
    /// `<string>` or bare text directly inside `<value>`
    String(String),
    /// `<double>`
    Double(f64),
    /// `<dateTime.iso8601>`
    DateTime(DateTime<FixedOffset>),
    /// `<base64>`; the payload is carried as text and never transcoded
    Base64(String),
    /// `<array><data>...</data></array>`
    Array(Vec<Value>),
    /// `<struct>` with its members keyed by name
    Struct(BTreeMap<String, Value>),
}

impl Value {
    /// Wire tag this value is written with. Used in mismatch reports.
    pub fn tag(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Int(_) => "int",
            Value::I8(_) => "i8",
            Value::UnsignedInt(_) => "i4",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::Double(_) => "double",
            Value::DateTime(_) => "dateTime.iso8601",
            Value::Base64(_) => "base64",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Returns the text of a `String` or `Base64` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Base64(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the member named `name` of a `Struct` value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(members) => members.get(name),
            _ => None,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Value::DateTime(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Struct(v)
    }
}
