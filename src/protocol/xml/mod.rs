//! XML-RPC is a remote procedure call protocol that encodes its calls
//! in XML and carries them over HTTP.
//!
//! <http://xmlrpc.com/spec.md>
//!
//! Its Rust-specific implementation is presented below. Host types are
//! mapped onto the wire grammar by two traits: [`Encode`] writes a complete
//! `<value>` element, [`Decode`] stores a parsed [`Value`] into an existing
//! destination in place. Where appropriate, the types of the XML-RPC grammar
//! have been replaced by similar Rust types. For example, `<int>` is written
//! for every signed integer width, `<double>` for both `f32` and `f64`, and
//! `<struct>` for maps keyed by strings as well as for Rust structs declared
//! through [`EncodeStruct!`](crate::EncodeStruct) and
//! [`DecodeStruct!`](crate::DecodeStruct).
//!
//! Decoding only accepts the wire tags that fit the destination:
//!
//! | wire tag | destination |
//! |---|---|
//! | `int`, `i4` | any integer |
//! | `i8` | `i64`, `u64` |
//! | `string`, bare text, `base64` | `String`, [`Base64`] |
//! | `boolean` | `bool` |
//! | `double` | `f32`, `f64` |
//! | `dateTime.iso8601` | `DateTime<Utc>`, `DateTime<FixedOffset>` |
//! | `array` | `Vec<T>`, `Vec<Slot>` |
//! | `struct` | maps, declared structs |
//! | `<value/>`, empty leaf | anything, reset to its zero value |
//!
//! Everything else is an [`Error::TypeMismatch`].

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;
use std::io::Write;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use num_traits::FromPrimitive;

use crate::Error;

pub mod envelope;
mod parser;
mod utils;
mod value;

pub use envelope::{encode_method_call, Fault, ParamList, Params, Response};
pub use parser::{CharsetReader, Decoder};
pub use utils::parse_datetime;
pub use value::Value;

pub trait Encode {
    /// Writes the implementing value as a complete `<value>` element.
    ///
    /// ## Parameters
    /// * `dest` - Where will the value be encoded to.
    ///
    /// ## Returns
    /// * `Result<(), Error>` - Ok(()) on success, or an error if the value has
    ///   no wire representation or the writer fails.
    fn encode<W: Write>(&self, dest: &mut W) -> Result<(), Error>;

    /// Reports whether the value equals its type's zero value.
    ///
    /// Consulted by `[omitempty]` struct fields.
    fn is_zero(&self) -> bool {
        false
    }
}

pub trait Decode {
    /// Stores a parsed wire value into `self`.
    ///
    /// ## Parameters
    /// * `value` - The value parsed from the wire.
    ///
    /// ## Returns
    /// * `Result<(), Error>` - Ok(()) on success, or a [`Error::TypeMismatch`]
    ///   if the wire tag does not fit the destination.
    fn decode(&mut self, value: Value) -> Result<(), Error>;
}

/// Encodes `value` into a standalone `<value>` element.
pub fn encode<T: Encode + ?Sized>(value: &T) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    value.encode(&mut buf)?;
    Ok(buf)
}

/// Decodes the first `<value>` element found in `data` into `dest`.
///
/// A document without any `<value>` leaves `dest` untouched.
pub fn decode<T: Decode + ?Sized>(data: &[u8], dest: &mut T) -> Result<(), Error> {
    Decoder::default().decode(data, dest)
}

/// Decoding based on the [Default] trait of the type T.
pub fn from_value<T>(value: Value) -> Result<T, Error>
where
    T: Decode + Default,
{
    let mut val = T::default();
    val.decode(value)?;

    Ok(val)
}

/// String type written with the `<base64>` tag.
///
/// The payload is passed through as text: no base64 transformation is
/// performed in either direction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Base64(pub String);

/// Element of a sequence that is either bound to caller-owned storage or
/// holds a value decoded on the fly.
///
/// Decoding an array into a `Vec<Slot>` fills the bound slots by index and
/// appends [`Slot::Value`] entries for wire elements past the end.
pub enum Slot<'a> {
    Bound(&'a mut dyn Decode),
    Value(Value),
}

macro_rules! signed_codec {
    ($($t:ty => $wide:expr),*) => {$(
        impl Encode for $t {
            fn encode<W: Write>(&self, dest: &mut W) -> Result<(), Error> {
                write!(dest, "<value><int>{self}</int></value>")?;
                Ok(())
            }

            fn is_zero(&self) -> bool {
                *self == 0
            }
        }

        impl Decode for $t {
            fn decode(&mut self, value: Value) -> Result<(), Error> {
                *self = integer(value, $wide, stringify!($t))?;
                Ok(())
            }
        }
    )*};
}

/// Unsigned integers use the `<i4>` tag, kept apart from signed `<int>`.
macro_rules! unsigned_codec {
    ($($t:ty => $wide:expr),*) => {$(
        impl Encode for $t {
            fn encode<W: Write>(&self, dest: &mut W) -> Result<(), Error> {
                write!(dest, "<value><i4>{self}</i4></value>")?;
                Ok(())
            }

            fn is_zero(&self) -> bool {
                *self == 0
            }
        }

        impl Decode for $t {
            fn decode(&mut self, value: Value) -> Result<(), Error> {
                *self = integer(value, $wide, stringify!($t))?;
                Ok(())
            }
        }
    )*};
}

/// `isize` and `usize` accept `<i8>` where they are 64 bits wide.
const WIDE_POINTER: bool = cfg!(target_pointer_width = "64");

signed_codec!(i8 => false, i16 => false, i32 => false, i64 => true, isize => WIDE_POINTER);
unsigned_codec!(u8 => false, u16 => false, u32 => false, u64 => true, usize => WIDE_POINTER);

/// Converts an integer leaf into the destination width.
///
/// `<i8>` is only accepted when `wide` is set, i.e. for 64-bit destinations.
fn integer<T>(value: Value, wide: bool, target: &'static str) -> Result<T, Error>
where
    T: FromPrimitive + Default,
{
    let converted = match value {
        Value::Nil => return Ok(T::default()),
        Value::Int(v) => T::from_i64(v),
        Value::I8(v) if wide => T::from_i64(v),
        Value::UnsignedInt(v) => T::from_u64(v),
        other => return Err(Error::mismatch(other.tag(), target)),
    };
    converted.ok_or_else(|| Error::parse(format!("integer out of range for {target}")))
}

macro_rules! float_codec {
    ($($t:ty),*) => {$(
        /// Written with the shortest spelling that reads back to the same value.
        impl Encode for $t {
            fn encode<W: Write>(&self, dest: &mut W) -> Result<(), Error> {
                if !self.is_finite() {
                    return Err(Error::Encoding(format!("{self} has no XML-RPC representation")));
                }
                write!(dest, "<value><double>{self}</double></value>")?;
                Ok(())
            }

            fn is_zero(&self) -> bool {
                *self == 0.0
            }
        }

        impl Decode for $t {
            fn decode(&mut self, value: Value) -> Result<(), Error> {
                match value {
                    Value::Nil => *self = 0.0,
                    Value::Double(v) => *self = v as $t,
                    other => return Err(Error::mismatch(other.tag(), stringify!($t))),
                }
                Ok(())
            }
        }
    )*};
}

float_codec!(f32, f64);

/// XML-RPC `boolean` is written as the literal `1` or `0`.
impl Encode for bool {
    fn encode<W: Write>(&self, dest: &mut W) -> Result<(), Error> {
        let literal: &[u8] = if *self {
            b"<value><boolean>1</boolean></value>"
        } else {
            b"<value><boolean>0</boolean></value>"
        };
        dest.write_all(literal)?;
        Ok(())
    }

    fn is_zero(&self) -> bool {
        !*self
    }
}

impl Decode for bool {
    fn decode(&mut self, value: Value) -> Result<(), Error> {
        match value {
            Value::Nil => *self = false,
            Value::Boolean(v) => *self = v,
            other => return Err(Error::mismatch(other.tag(), "bool")),
        }
        Ok(())
    }
}

impl Encode for str {
    fn encode<W: Write>(&self, dest: &mut W) -> Result<(), Error> {
        write_text("string", self, dest)
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl Encode for String {
    fn encode<W: Write>(&self, dest: &mut W) -> Result<(), Error> {
        self.as_str().encode(dest)
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl Decode for String {
    fn decode(&mut self, value: Value) -> Result<(), Error> {
        match value {
            Value::Nil => self.clear(),
            Value::String(v) | Value::Base64(v) => *self = v,
            other => return Err(Error::mismatch(other.tag(), "String")),
        }
        Ok(())
    }
}

impl Encode for Base64 {
    fn encode<W: Write>(&self, dest: &mut W) -> Result<(), Error> {
        write_text("base64", &self.0, dest)
    }

    fn is_zero(&self) -> bool {
        self.0.is_empty()
    }
}

impl Decode for Base64 {
    fn decode(&mut self, value: Value) -> Result<(), Error> {
        self.0.decode(value).map_err(|err| match err {
            Error::TypeMismatch { wire, .. } => Error::mismatch(wire, "Base64"),
            other => other,
        })
    }
}

fn write_text<W: Write>(tag: &str, text: &str, dest: &mut W) -> Result<(), Error> {
    write!(dest, "<value><{tag}>")?;
    utils::write_escaped(text, dest)?;
    write!(dest, "</{tag}></value>")?;
    Ok(())
}

/// Calendar instants are written in their own offset, without a zone suffix.
impl<Tz: TimeZone> Encode for DateTime<Tz>
where
    Tz::Offset: std::fmt::Display,
{
    fn encode<W: Write>(&self, dest: &mut W) -> Result<(), Error> {
        write!(
            dest,
            "<value><dateTime.iso8601>{}</dateTime.iso8601></value>",
            self.format(utils::ISO8601)
        )?;
        Ok(())
    }

    fn is_zero(&self) -> bool {
        self.timestamp() == 0 && self.timestamp_subsec_nanos() == 0
    }
}

impl Decode for DateTime<FixedOffset> {
    fn decode(&mut self, value: Value) -> Result<(), Error> {
        match value {
            Value::Nil => *self = DateTime::default(),
            Value::DateTime(v) => *self = v,
            other => return Err(Error::mismatch(other.tag(), "DateTime<FixedOffset>")),
        }
        Ok(())
    }
}

impl Decode for DateTime<Utc> {
    fn decode(&mut self, value: Value) -> Result<(), Error> {
        match value {
            Value::Nil => *self = DateTime::default(),
            Value::DateTime(v) => *self = v.with_timezone(&Utc),
            other => return Err(Error::mismatch(other.tag(), "DateTime<Utc>")),
        }
        Ok(())
    }
}

impl<T: Encode> Encode for [T] {
    fn encode<W: Write>(&self, dest: &mut W) -> Result<(), Error> {
        dest.write_all(b"<value><array><data>")?;
        for item in self {
            item.encode(dest)?;
        }
        dest.write_all(b"</data></array></value>")?;
        Ok(())
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl<const N: usize, T: Encode> Encode for [T; N] {
    fn encode<W: Write>(&self, dest: &mut W) -> Result<(), Error> {
        self.as_slice().encode(dest)
    }

    fn is_zero(&self) -> bool {
        self.iter().all(Encode::is_zero)
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode<W: Write>(&self, dest: &mut W) -> Result<(), Error> {
        self.as_slice().encode(dest)
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

/// A fresh sequence: one newly created element per wire item.
///
/// Previous contents are replaced only once every element decoded.
impl<T: Decode + Default> Decode for Vec<T> {
    fn decode(&mut self, value: Value) -> Result<(), Error> {
        match value {
            Value::Nil => self.clear(),
            Value::Array(items) => {
                *self = items.into_iter().map(from_value).collect::<Result<Vec<T>, Error>>()?;
            }
            other => return Err(Error::mismatch(other.tag(), std::any::type_name::<Self>())),
        }
        Ok(())
    }
}

/// Pre-bound output targets: wire element `i` lands in slot `i`, the rest
/// are appended as freshly decoded values.
///
/// An empty `<value/>` resets every slot to its zero value and keeps the length.
impl Decode for Vec<Slot<'_>> {
    fn decode(&mut self, value: Value) -> Result<(), Error> {
        let items = match value {
            Value::Nil => {
                for slot in self.iter_mut() {
                    match slot {
                        Slot::Bound(target) => target.decode(Value::Nil)?,
                        Slot::Value(existing) => *existing = Value::Nil,
                    }
                }
                return Ok(());
            }
            Value::Array(items) => items,
            other => return Err(Error::mismatch(other.tag(), "Vec<Slot>")),
        };
        for (i, item) in items.into_iter().enumerate() {
            match self.get_mut(i) {
                Some(Slot::Bound(target)) => target.decode(item)?,
                Some(Slot::Value(existing)) => *existing = item,
                None => self.push(Slot::Value(item)),
            }
        }
        Ok(())
    }
}

/// Writes the members of a `<struct>` value one at a time.
pub struct StructWriter<'a, W: Write> {
    dest: &'a mut W,
}

impl<'a, W: Write> StructWriter<'a, W> {
    pub fn begin(dest: &'a mut W) -> Result<Self, Error> {
        dest.write_all(b"<value><struct>")?;
        Ok(Self { dest })
    }

    pub fn member<T: Encode + ?Sized>(&mut self, name: &str, value: &T) -> Result<(), Error> {
        self.dest.write_all(b"<member><name>")?;
        utils::write_escaped(name, &mut *self.dest)?;
        self.dest.write_all(b"</name>")?;
        value.encode(&mut *self.dest)?;
        self.dest.write_all(b"</member>")?;
        Ok(())
    }

    /// Writes a struct field, skipping it when `omit_if_empty` is set and the
    /// field holds its zero value.
    pub fn field<T: Encode + ?Sized>(
        &mut self,
        name: &str,
        value: &T,
        omit_if_empty: bool,
    ) -> Result<(), Error> {
        if omit_if_empty && value.is_zero() {
            return Ok(());
        }
        self.member(name, value)
    }

    pub fn end(self) -> Result<(), Error> {
        self.dest.write_all(b"</struct></value>")?;
        Ok(())
    }
}

/// Maps are written as structs with members in ascending key order.
impl<K: AsRef<str> + Ord, V: Encode> Encode for BTreeMap<K, V> {
    fn encode<W: Write>(&self, dest: &mut W) -> Result<(), Error> {
        let mut members = StructWriter::begin(dest)?;
        for (name, value) in self {
            members.member(name.as_ref(), value)?;
        }
        members.end()
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl<K: AsRef<str>, V: Encode, S> Encode for HashMap<K, V, S> {
    fn encode<W: Write>(&self, dest: &mut W) -> Result<(), Error> {
        let mut sorted: Vec<(&str, &V)> = self.iter().map(|(k, v)| (k.as_ref(), v)).collect();
        sorted.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let mut members = StructWriter::begin(dest)?;
        for (name, value) in sorted {
            members.member(name, value)?;
        }
        members.end()
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl<V: Decode + Default> Decode for BTreeMap<String, V> {
    fn decode(&mut self, value: Value) -> Result<(), Error> {
        self.clear();
        match value {
            Value::Nil => {}
            Value::Struct(members) => {
                for (name, member) in members {
                    self.insert(name, from_value(member)?);
                }
            }
            other => return Err(Error::mismatch(other.tag(), std::any::type_name::<Self>())),
        }
        Ok(())
    }
}

impl<V: Decode + Default, S: BuildHasher> Decode for HashMap<String, V, S> {
    fn decode(&mut self, value: Value) -> Result<(), Error> {
        self.clear();
        match value {
            Value::Nil => {}
            Value::Struct(members) => {
                for (name, member) in members {
                    self.insert(name, from_value(member)?);
                }
            }
            other => return Err(Error::mismatch(other.tag(), std::any::type_name::<Self>())),
        }
        Ok(())
    }
}

/// `None` is written as an empty `<value/>`.
impl<T: Encode> Encode for Option<T> {
    fn encode<W: Write>(&self, dest: &mut W) -> Result<(), Error> {
        match self {
            Some(value) => value.encode(dest),
            None => {
                dest.write_all(b"<value/>")?;
                Ok(())
            }
        }
    }

    fn is_zero(&self) -> bool {
        self.is_none()
    }
}

impl<T: Decode + Default> Decode for Option<T> {
    fn decode(&mut self, value: Value) -> Result<(), Error> {
        if value.is_nil() {
            *self = None;
            return Ok(());
        }
        self.get_or_insert_with(T::default).decode(value)
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode<W: Write>(&self, dest: &mut W) -> Result<(), Error> {
        (**self).encode(dest)
    }

    fn is_zero(&self) -> bool {
        (**self).is_zero()
    }
}

impl<T: Encode + ?Sized> Encode for Box<T> {
    fn encode<W: Write>(&self, dest: &mut W) -> Result<(), Error> {
        (**self).encode(dest)
    }

    fn is_zero(&self) -> bool {
        (**self).is_zero()
    }
}

impl<T: Decode + ?Sized> Decode for &mut T {
    fn decode(&mut self, value: Value) -> Result<(), Error> {
        (**self).decode(value)
    }
}

impl<T: Decode + ?Sized> Decode for Box<T> {
    fn decode(&mut self, value: Value) -> Result<(), Error> {
        (**self).decode(value)
    }
}

/// Discarding destination: accepts anything.
impl Decode for () {
    fn decode(&mut self, _value: Value) -> Result<(), Error> {
        Ok(())
    }
}

impl Encode for Value {
    fn encode<W: Write>(&self, dest: &mut W) -> Result<(), Error> {
        match self {
            Value::Nil => dest.write_all(b"<value/>")?,
            Value::Int(v) => v.encode(dest)?,
            Value::I8(v) => write!(dest, "<value><i8>{v}</i8></value>")?,
            Value::UnsignedInt(v) => v.encode(dest)?,
            Value::Boolean(v) => v.encode(dest)?,
            Value::String(v) => v.encode(dest)?,
            Value::Double(v) => v.encode(dest)?,
            Value::DateTime(v) => v.encode(dest)?,
            Value::Base64(v) => write_text("base64", v, dest)?,
            Value::Array(items) => items.encode(dest)?,
            Value::Struct(members) => members.encode(dest)?,
        }
        Ok(())
    }

    fn is_zero(&self) -> bool {
        self.is_nil()
    }
}

/// The dynamic destination keeps whatever arrived.
impl Decode for Value {
    fn decode(&mut self, value: Value) -> Result<(), Error> {
        *self = value;
        Ok(())
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __wire_name {
    ($field:ident) => {
        stringify!($field)
    };
    ($field:ident $name:literal) => {
        $name
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __omit_if_empty {
    () => {
        false
    };
    (omitempty) => {
        true
    };
}

/// Macro for implementing [`Encode`] for structs.
///
/// Fields are written as struct members in the order they are listed. Each
/// field takes an optional wire name and an optional `[omitempty]` flag:
///
/// ```ignore
/// EncodeStruct!(Book, title => "Title", amount, author => "author" [omitempty]);
/// ```
///
/// Fields that are not listed are never written.
#[allow(non_camel_case_types)]
#[macro_export]
macro_rules! EncodeStruct {
    (
        $t:ty
        $(, $field:ident $(=> $name:literal)? $([$opt:ident])?)*
    ) => {
        impl $crate::xml::Encode for $t {
            fn encode<W: std::io::Write>(&self, dest: &mut W) -> Result<(), $crate::Error> {
                #[allow(unused_mut)]
                let mut members = $crate::xml::StructWriter::begin(dest)?;
                $(
                    members.field(
                        $crate::__wire_name!($field $($name)?),
                        &self.$field,
                        $crate::__omit_if_empty!($($opt)?),
                    )?;
                )*
                members.end()
            }

            fn is_zero(&self) -> bool {
                true $(&& $crate::xml::Encode::is_zero(&self.$field))*
            }
        }
    };
}

/// Macro for implementing [`Decode`] for structs.
///
/// Members are matched by exact wire name. Unmatched members are ignored,
/// and members naming a field that is not listed are skipped without error.
/// An empty `<value/>` resets the struct to its [Default].
#[allow(non_camel_case_types)]
#[macro_export]
macro_rules! DecodeStruct {
    (
        $t:ty
        $(, $field:ident $(=> $name:literal)? $([$opt:ident])?)*
    ) => {
        impl $crate::xml::Decode for $t {
            #[allow(unused_variables)]
            fn decode(&mut self, value: $crate::xml::Value) -> Result<(), $crate::Error> {
                match value {
                    $crate::xml::Value::Nil => {
                        *self = <$t as Default>::default();
                        Ok(())
                    }
                    $crate::xml::Value::Struct(members) => {
                        for (name, member) in members {
                            $(
                                if name == $crate::__wire_name!($field $($name)?) {
                                    $crate::xml::Decode::decode(&mut self.$field, member)?;
                                    continue;
                                }
                            )*
                        }
                        Ok(())
                    }
                    other => Err($crate::Error::TypeMismatch {
                        wire: other.tag(),
                        target: stringify!($t),
                    }),
                }
            }
        }
    };
}

// Re-export public macros for use in other modules
pub use crate::DecodeStruct;
pub use crate::EncodeStruct;
