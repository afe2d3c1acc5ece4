//! XML-RPC Mamont - An XML-RPC client implementation in Rust
//!
//! This library implements the client side of the XML-RPC protocol: it
//! serializes a method name and arguments into a `<methodCall>` document,
//! sends it over an HTTP transport, and turns the `<methodResponse>` back
//! into host values or an application fault.
//!
//! ## Supported Features
//!
//! - The full XML-RPC value grammar: `int`/`i4`/`i8`, `boolean`, `string`,
//!   `double`, `dateTime.iso8601`, `base64`, `array` and `struct`
//! - Type-driven encoding and in-place decoding through the `Encode` and
//!   `Decode` traits, with struct mapping via `EncodeStruct!`/`DecodeStruct!`
//! - Faults reported as typed errors with their code and message
//! - Per-call deadlines and cancellation
//! - Headers, basic authentication and cookies
//! - Non-UTF-8 response charsets through an injectable resolver
//! - A concurrent codec/dispatcher mode for many calls in flight
//!
//! ## Main Components
//!
//! - `client`: The [`Client`] that runs calls end to end, and its builder.
//!
//! - `transport`: The HTTP collaborator interface. The crate ships no
//!   network stack of its own; any HTTP client can be plugged in.
//!
//! - `protocol`: The XML value grammar and envelopes (`xml`), and the call
//!   context and concurrent dispatching machinery (`rpc`).
//!
//! ## Usage
//!
//! Implement the `Transport` trait for an HTTP client, create a [`Client`]
//! for the server URL, and call methods with any `Encode` arguments:
//!
//! ```ignore
//! let client = Client::new("http://localhost:8000/RPC2", transport);
//! let mut sum = 0i32;
//! client.call("Math.add", &(1, 2), &mut sum).await?;
//! ```

pub mod client;
mod error;
pub mod protocol;
pub mod transport;

pub use client::{Client, ClientBuilder};
pub use error::{Error, TransportError};
pub use protocol::rpc::{CallContext, CancellationToken, LegacyClient};
pub use protocol::xml;
pub use protocol::xml::Fault;
