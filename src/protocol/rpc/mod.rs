//! Call plumbing shared by the XML-RPC clients.
//!
//! XML-RPC itself has no notion of request identifiers: one HTTP exchange
//! carries exactly one call. This module layers the pieces needed to run
//! many calls at once on top of that:
//!
//! 1. [`CallContext`] bounds a single call with a deadline and a cancellation token
//! 2. [`ClientCodec`] splits a call into request writing and response reading
//! 3. [`Dispatcher`] correlates responses to callers by sequence number
//! 4. [`HttpCodec`] implements the codec on top of a [`Transport`](crate::transport::Transport)
//!
//! [`LegacyClient`] combines the last two into a ready-to-use concurrent
//! client for code written against the request/response codec model.

mod codec;
mod context;
mod dispatcher;

pub use codec::HttpCodec;
pub use context::{CallContext, CancellationToken};
pub use dispatcher::{ClientCodec, Dispatcher, RequestHeader, ResponseHeader};

/// Concurrent client driving an [`HttpCodec`].
pub type LegacyClient = Dispatcher<HttpCodec>;
