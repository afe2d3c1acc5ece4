//! Protocol module implements the XML-RPC client protocol.
//!
//! This module contains two main components:
//!
//! - `xml`: the value grammar of XML-RPC, mapping host types to `<value>`
//!   elements and back, plus the method call and response envelopes.
//!
//! - `rpc`: per-call deadlines and cancellation, and the codec/dispatcher
//!   pair used to run many calls concurrently over one transport.
//!
//! XML-RPC is a stateless protocol: every call is a single HTTP `POST` of a
//! `<methodCall>` document answered by a `<methodResponse>` document that
//! holds either one result value or a fault.

pub mod rpc;
pub mod xml;
