//! Method call and method response envelopes.
//!
//! A call is written as
//!
//! ```text
//! <?xml version="1.0" encoding="UTF-8"?><methodCall><methodName>NAME</methodName>
//! <params><param>VALUE</param>...</params></methodCall>
//! ```
//!
//! without any whitespace between elements. A response is either a
//! `<methodResponse>` holding one `<params><param>` value, or a
//! `<methodResponse>` holding a `<fault>` struct with `faultCode` and
//! `faultString` members.

use std::io::Write;

use super::{utils, Decode, Decoder, Encode, Value};
use crate::{DecodeStruct, Error};

const XML_HEADER: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>"#;
const FAULT_TAG: &[u8] = b"<fault>";

/// Initial capacity of a request body buffer.
const DEFAULT_BODY_CAPACITY: usize = 256;

/// Arguments of a method call.
///
/// Every [`Encode`] value is a single parameter, so a slice is passed as one
/// `<array>` parameter. Tuples and [`ParamList`] spread into one parameter
/// per element, and `()` produces a call without `<params>`.
pub trait Params {
    /// Writes the `<param>` elements of the call.
    fn write_params(&self, dest: &mut dyn Write) -> Result<(), Error>;

    /// Whether the `<params>` element is omitted altogether.
    fn is_empty(&self) -> bool {
        false
    }
}

impl<T: Encode + ?Sized> Params for T {
    fn write_params(&self, dest: &mut dyn Write) -> Result<(), Error> {
        write_param(self, dest)
    }
}

impl Params for () {
    fn write_params(&self, _dest: &mut dyn Write) -> Result<(), Error> {
        Ok(())
    }

    fn is_empty(&self) -> bool {
        true
    }
}

/// Heterogeneous argument list, one parameter per element.
///
/// An empty list still writes an empty `<params>` element.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamList(pub Vec<Value>);

impl Params for ParamList {
    fn write_params(&self, dest: &mut dyn Write) -> Result<(), Error> {
        for value in &self.0 {
            write_param(value, dest)?;
        }
        Ok(())
    }
}

macro_rules! tuple_params {
    ($($name:ident)+) => {
        impl<$($name: Encode),+> Params for ($($name,)+) {
            #[allow(non_snake_case)]
            fn write_params(&self, dest: &mut dyn Write) -> Result<(), Error> {
                let ($($name,)+) = self;
                $(write_param($name, dest)?;)+
                Ok(())
            }
        }
    };
}

tuple_params!(A);
tuple_params!(A B);
tuple_params!(A B C);
tuple_params!(A B C D);
tuple_params!(A B C D E);
tuple_params!(A B C D E F);
tuple_params!(A B C D E F G);
tuple_params!(A B C D E F G H);

fn write_param<T: Encode + ?Sized>(value: &T, mut dest: &mut dyn Write) -> Result<(), Error> {
    dest.write_all(b"<param>")?;
    value.encode(&mut dest)?;
    dest.write_all(b"</param>")?;
    Ok(())
}

/// Produces the complete request document of a call to `method`.
///
/// The method name is escaped like any other text.
pub fn encode_method_call<P: Params + ?Sized>(method: &str, params: &P) -> Result<Vec<u8>, Error> {
    let mut body = Vec::with_capacity(DEFAULT_BODY_CAPACITY);
    body.extend_from_slice(XML_HEADER);
    body.extend_from_slice(b"<methodCall><methodName>");
    utils::write_escaped(method, &mut body)?;
    body.extend_from_slice(b"</methodName>");
    if !params.is_empty() {
        body.extend_from_slice(b"<params>");
        params.write_params(&mut body)?;
        body.extend_from_slice(b"</params>");
    }
    body.extend_from_slice(b"</methodCall>");
    Ok(body)
}

/// Application-level error reported by the server.
#[derive(Clone, Debug, Default, PartialEq, Eq, thiserror::Error)]
#[error("Fault({code}): {message}")]
pub struct Fault {
    pub code: i64,
    pub message: String,
}

DecodeStruct!(Fault, code => "faultCode", message => "faultString");

/// Raw body of a method response.
#[derive(Clone, Debug)]
pub struct Response {
    body: Vec<u8>,
    decoder: Decoder,
}

impl Response {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self { body: body.into(), decoder: Decoder::default() }
    }

    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether the body contains a `<fault>` element.
    ///
    /// This is a byte-level check on the raw body, made before any parsing.
    pub fn is_fault(&self) -> bool {
        self.body.windows(FAULT_TAG.len()).any(|window| window == FAULT_TAG)
    }

    /// Extracts the fault carried by the body, if there is one.
    ///
    /// A fault struct missing either member reports that member's zero value.
    pub fn fault(&self) -> Result<Option<Fault>, Error> {
        if !self.is_fault() {
            return Ok(None);
        }
        let mut fault = Fault::default();
        self.decoder
            .decode(&self.body, &mut fault)
            .map_err(|err| Error::parse(format!("malformed fault response: {err}")))?;
        Ok(Some(fault))
    }

    /// Decodes the response value into `dest`.
    ///
    /// A body without any `<value>` leaves `dest` untouched.
    pub fn decode_into<T: Decode + ?Sized>(&self, dest: &mut T) -> Result<(), Error> {
        self.decoder.decode(&self.body, dest)
    }

    /// Returns the response value, [`Value::Nil`] when the body has none.
    pub fn value(&self) -> Result<Value, Error> {
        Ok(self.decoder.parse(&self.body)?.unwrap_or_default())
    }
}
