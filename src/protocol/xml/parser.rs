//! Reads XML-RPC documents into [`Value`] trees.
//!
//! The parser is deliberately narrow: it looks for the first `<value>`
//! element anywhere in the document and builds the value grammar from it,
//! ignoring the surrounding envelope. Whitespace between structural tags is
//! insignificant, comments are skipped, and nesting is bounded so hostile
//! input cannot exhaust the stack.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::trace;

use super::utils::parse_datetime;
use super::{Decode, Value};
use crate::Error;

/// Maximum nesting of `<value>` elements accepted on decode.
pub const MAX_DEPTH: usize = 256;

/// Converts documents declared in a non-UTF-8 charset into UTF-8.
pub trait CharsetReader: Send + Sync {
    /// Wraps `input`, declared as `charset`, into a reader producing UTF-8.
    fn reader<'a>(&self, charset: &str, input: &'a [u8]) -> std::io::Result<Box<dyn Read + 'a>>;
}

/// Turns response bodies into values and stores them into destinations.
#[derive(Clone, Default)]
pub struct Decoder {
    charset_reader: Option<Arc<dyn CharsetReader>>,
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("charset_reader", &self.charset_reader.is_some())
            .finish()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a decoder able to read documents declared in other charsets.
    pub fn with_charset_reader(charset_reader: Arc<dyn CharsetReader>) -> Self {
        Self { charset_reader: Some(charset_reader) }
    }

    /// Decodes the first `<value>` of `data` into `dest`.
    ///
    /// `dest` is left untouched when the document holds no `<value>`.
    pub fn decode<T: Decode + ?Sized>(&self, data: &[u8], dest: &mut T) -> Result<(), Error> {
        match self.parse(data)? {
            Some(value) => dest.decode(value),
            None => Ok(()),
        }
    }

    /// Parses the first `<value>` of `data`, if there is one.
    pub fn parse(&self, data: &[u8]) -> Result<Option<Value>, Error> {
        let text = self.transcode(data)?;
        Parser::new(&text).first_value()
    }

    fn transcode<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, str>, Error> {
        let charset = match declared_encoding(data)? {
            Some(charset) if !charset.eq_ignore_ascii_case("utf-8") => charset,
            _ => return std::str::from_utf8(data).map(Cow::Borrowed).map_err(Error::parse),
        };

        let Some(charset_reader) = &self.charset_reader else {
            return Err(Error::parse(format!("no charset reader for encoding {charset:?}")));
        };
        trace!("transcoding {} bytes from {}", data.len(), charset);

        let mut reader = charset_reader.reader(&charset, data).map_err(Error::parse)?;
        let mut text = String::new();
        reader.read_to_string(&mut text).map_err(Error::parse)?;
        Ok(Cow::Owned(text))
    }
}

/// Returns the `encoding` attribute of the XML declaration, if any.
fn declared_encoding(data: &[u8]) -> Result<Option<String>, Error> {
    let mut reader = Reader::from_reader(data);
    loop {
        match reader.read_event()? {
            Event::Decl(decl) => {
                return match decl.encoding() {
                    Some(Ok(encoding)) => Ok(Some(String::from_utf8_lossy(&encoding).into_owned())),
                    Some(Err(err)) => Err(Error::parse(err)),
                    None => Ok(None),
                };
            }
            Event::Text(_) | Event::Comment(_) => {}
            _ => return Ok(None),
        }
    }
}

struct Parser<'a> {
    reader: Reader<&'a [u8]>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self { reader: Reader::from_str(text) }
    }

    fn next(&mut self) -> Result<Event<'a>, Error> {
        Ok(self.reader.read_event()?)
    }

    fn first_value(&mut self) -> Result<Option<Value>, Error> {
        loop {
            match self.next()? {
                Event::Start(e) if e.name().as_ref() == b"value" => return self.value(0).map(Some),
                Event::Empty(e) if e.name().as_ref() == b"value" => return Ok(Some(Value::Nil)),
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }

    /// Reads the content of a `<value>` whose start tag was just consumed.
    fn value(&mut self, depth: usize) -> Result<Value, Error> {
        if depth > MAX_DEPTH {
            return Err(Error::parse("value nesting is too deep"));
        }

        let mut text = String::new();
        loop {
            match self.next()? {
                Event::Text(t) => text.push_str(&t.unescape().map_err(Error::parse)?),
                Event::CData(c) => text.push_str(std::str::from_utf8(&c).map_err(Error::parse)?),
                Event::Start(e) => {
                    let value = self.typed(e.name().as_ref(), depth)?;
                    self.close("value")?;
                    return Ok(value);
                }
                Event::Empty(e) => {
                    let value = empty_leaf(e.name().as_ref())?;
                    self.close("value")?;
                    return Ok(value);
                }
                Event::End(_) if text.is_empty() => return Ok(Value::Nil),
                Event::End(_) => return Ok(Value::String(text)),
                Event::Eof => return Err(unexpected_eof("value")),
                _ => {}
            }
        }
    }

    /// Reads a typed child of `<value>` whose start tag was just consumed.
    fn typed(&mut self, tag: &[u8], depth: usize) -> Result<Value, Error> {
        match tag {
            b"int" | b"i4" => integer(&self.leaf()?),
            b"i8" => {
                let text = self.leaf()?;
                match text.trim() {
                    "" => Ok(Value::Nil),
                    v => v.parse().map(Value::I8).map_err(|_| invalid("i8", v)),
                }
            }
            b"boolean" => {
                let text = self.leaf()?;
                match text.trim() {
                    "" => Ok(Value::Nil),
                    "1" => Ok(Value::Boolean(true)),
                    "0" => Ok(Value::Boolean(false)),
                    v => Err(invalid("boolean", v)),
                }
            }
            b"double" => {
                let text = self.leaf()?;
                match text.trim() {
                    "" => Ok(Value::Nil),
                    v => v.parse().map(Value::Double).map_err(|_| invalid("double", v)),
                }
            }
            b"dateTime.iso8601" => {
                let text = self.leaf()?;
                match text.trim() {
                    "" => Ok(Value::Nil),
                    v => parse_datetime(v).map(Value::DateTime),
                }
            }
            b"string" => self.leaf().map(Value::String),
            b"base64" => self.leaf().map(Value::Base64),
            b"array" => self.array(depth),
            b"struct" => self.structure(depth),
            other => Err(Error::parse(format!(
                "unsupported value type <{}>",
                String::from_utf8_lossy(other)
            ))),
        }
    }

    /// Collects the text of a leaf element up to its end tag.
    fn leaf(&mut self) -> Result<String, Error> {
        let mut text = String::new();
        loop {
            match self.next()? {
                Event::Text(t) => text.push_str(&t.unescape().map_err(Error::parse)?),
                Event::CData(c) => text.push_str(std::str::from_utf8(&c).map_err(Error::parse)?),
                Event::End(_) => return Ok(text),
                Event::Start(e) | Event::Empty(e) => return Err(unexpected(e.name().as_ref())),
                Event::Eof => return Err(unexpected_eof("leaf")),
                _ => {}
            }
        }
    }

    fn array(&mut self, depth: usize) -> Result<Value, Error> {
        let mut items = Vec::new();
        loop {
            match self.next()? {
                Event::Start(e) if e.name().as_ref() == b"data" => self.data(depth, &mut items)?,
                Event::Empty(e) if e.name().as_ref() == b"data" => {}
                Event::End(_) => return Ok(Value::Array(items)),
                Event::Start(e) | Event::Empty(e) => return Err(unexpected(e.name().as_ref())),
                Event::Eof => return Err(unexpected_eof("array")),
                _ => {}
            }
        }
    }

    fn data(&mut self, depth: usize, items: &mut Vec<Value>) -> Result<(), Error> {
        loop {
            match self.next()? {
                Event::Start(e) if e.name().as_ref() == b"value" => {
                    items.push(self.value(depth + 1)?)
                }
                Event::Empty(e) if e.name().as_ref() == b"value" => items.push(Value::Nil),
                Event::End(_) => return Ok(()),
                Event::Start(e) | Event::Empty(e) => return Err(unexpected(e.name().as_ref())),
                Event::Eof => return Err(unexpected_eof("data")),
                _ => {}
            }
        }
    }

    fn structure(&mut self, depth: usize) -> Result<Value, Error> {
        let mut members = BTreeMap::new();
        loop {
            match self.next()? {
                Event::Start(e) if e.name().as_ref() == b"member" => {
                    let (name, value) = self.member(depth)?;
                    members.insert(name, value);
                }
                Event::End(_) => return Ok(Value::Struct(members)),
                Event::Start(e) | Event::Empty(e) => return Err(unexpected(e.name().as_ref())),
                Event::Eof => return Err(unexpected_eof("struct")),
                _ => {}
            }
        }
    }

    fn member(&mut self, depth: usize) -> Result<(String, Value), Error> {
        let mut name = None;
        let mut value = Value::Nil;
        loop {
            match self.next()? {
                Event::Start(e) if e.name().as_ref() == b"name" => name = Some(self.leaf()?),
                Event::Empty(e) if e.name().as_ref() == b"name" => name = Some(String::new()),
                Event::Start(e) if e.name().as_ref() == b"value" => value = self.value(depth + 1)?,
                Event::Empty(e) if e.name().as_ref() == b"value" => value = Value::Nil,
                Event::End(_) => break,
                Event::Start(e) | Event::Empty(e) => return Err(unexpected(e.name().as_ref())),
                Event::Eof => return Err(unexpected_eof("member")),
                _ => {}
            }
        }

        let name = name.ok_or_else(|| Error::parse("struct member without <name>"))?;
        Ok((name, value))
    }

    /// Skips to the end tag of the element that is currently open.
    fn close(&mut self, element: &str) -> Result<(), Error> {
        loop {
            match self.next()? {
                Event::End(_) => return Ok(()),
                Event::Start(e) | Event::Empty(e) => return Err(unexpected(e.name().as_ref())),
                Event::Eof => return Err(unexpected_eof(element)),
                _ => {}
            }
        }
    }
}

fn integer(text: &str) -> Result<Value, Error> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Value::Nil);
    }
    if let Ok(v) = text.parse::<i64>() {
        return Ok(Value::Int(v));
    }
    text.parse::<u64>().map(Value::UnsignedInt).map_err(|_| invalid("int", text))
}

/// Value of a self-closing typed element such as `<string/>`.
fn empty_leaf(tag: &[u8]) -> Result<Value, Error> {
    match tag {
        b"int" | b"i4" | b"i8" | b"boolean" | b"double" | b"dateTime.iso8601" => Ok(Value::Nil),
        b"string" => Ok(Value::String(String::new())),
        b"base64" => Ok(Value::Base64(String::new())),
        b"array" => Ok(Value::Array(Vec::new())),
        b"struct" => Ok(Value::Struct(BTreeMap::new())),
        other => Err(Error::parse(format!(
            "unsupported value type <{}>",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn invalid(tag: &str, text: &str) -> Error {
    Error::parse(format!("invalid <{tag}> content {text:?}"))
}

fn unexpected(tag: &[u8]) -> Error {
    Error::parse(format!("unexpected element <{}>", String::from_utf8_lossy(tag)))
}

fn unexpected_eof(element: &str) -> Error {
    Error::parse(format!("unexpected end of document inside <{element}>"))
}
