//! Error taxonomy of the XML-RPC client.
//!
//! Every failure a call can produce is represented by [`Error`]. The variants
//! are mutually exclusive per call: a response that fails the status check is
//! never inspected for a fault, and a fault is never handed to the decoder.

use crate::protocol::xml::Fault;

/// Errors produced while encoding, transporting or decoding an XML-RPC call.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A host value has no representation on the wire.
    #[error("xmlrpc: encoding error: {0}")]
    Encoding(String),

    /// The wire value cannot be stored in the destination.
    #[error("xmlrpc: type mismatch: cannot decode <{wire}> into {target}")]
    TypeMismatch {
        /// Wire tag of the received value
        wire: &'static str,
        /// Host type of the destination
        target: &'static str,
    },

    /// Malformed XML, an unparsable leaf or an unrecognized datetime spelling.
    #[error("xmlrpc: parse error: {0}")]
    Parse(String),

    /// Application-level fault reported by the remote side.
    #[error(transparent)]
    Fault(#[from] Fault),

    /// The transport answered with a status outside `200..300`.
    #[error("xmlrpc: unexpected status code {0}")]
    Status(u16),

    /// The round trip itself failed, was cancelled or ran out of time.
    #[error("xmlrpc: {0}")]
    Transport(#[from] TransportError),

    /// The concurrent codec adapter has been closed.
    #[error("xmlrpc: codec is closed")]
    Closed,
}

impl Error {
    pub(crate) fn mismatch(wire: &'static str, target: &'static str) -> Self {
        Error::TypeMismatch { wire, target }
    }

    pub(crate) fn parse(message: impl std::fmt::Display) -> Self {
        Error::Parse(message.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Encoding(err.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

/// Failure of the transport round trip.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The caller's cancellation token fired before the round trip finished.
    #[error("call cancelled")]
    Cancelled,

    /// The caller's deadline passed before the round trip finished.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Network or collaborator failure.
    #[error(transparent)]
    Failed(anyhow::Error),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Transport(TransportError::Failed(err))
    }
}
