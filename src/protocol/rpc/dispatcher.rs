//! Call dispatcher for request/response codecs
//!
//! This module drives a [`ClientCodec`] for any number of concurrent callers.
//! Each call is registered under a fresh sequence number before its request
//! is written. A single reader task pulls responses off the codec in the
//! order the codec makes them ready and routes every response back to the
//! caller waiting on its sequence number.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::protocol::xml::{Decode, Params, Value};
use crate::Error;

/// Header of an outgoing request
#[derive(Clone, Debug, Default)]
pub struct RequestHeader {
    /// Sequence number correlating the request with its response
    pub seq: u64,
    /// Remote method name
    pub method: String,
}

/// Header of an incoming response
#[derive(Debug, Default)]
pub struct ResponseHeader {
    /// Sequence number of the request this response answers
    pub seq: u64,
    /// Failure reported for this call; the body is still read and discarded
    pub error: Option<Error>,
}

/// Request/response codec driven by a [`Dispatcher`].
///
/// The dispatcher calls `write_request` from any number of tasks at once,
/// and `read_response_header` followed by `read_response_body` from a
/// single reader task, strictly alternating.
#[async_trait]
pub trait ClientCodec: Send + Sync + 'static {
    /// Sends one request.
    async fn write_request(
        &self,
        header: &RequestHeader,
        args: &(dyn Params + Sync),
    ) -> Result<(), Error>;

    /// Waits for the next ready response and returns its header.
    ///
    /// An error stops the reader task and fails every pending call.
    async fn read_response_header(&self) -> Result<ResponseHeader, Error>;

    /// Returns the body of the response whose header was read last.
    async fn read_response_body(&self) -> Result<Value, Error>;

    /// Shuts the codec down. Called at most once.
    fn close(&self) -> Result<(), Error>;
}

type PendingCall = oneshot::Sender<Result<Value, Error>>;

#[derive(Default)]
struct PendingCalls {
    calls: HashMap<u64, PendingCall>,
    shutdown: bool,
}

type SharedPending = Arc<Mutex<PendingCalls>>;

fn lock(pending: &SharedPending) -> std::sync::MutexGuard<'_, PendingCalls> {
    pending.lock().expect("unable to unlock pending calls mutex")
}

/// Removes a call from the pending table when its caller goes away,
/// whether the call finished or its future was dropped mid-flight.
struct PendingGuard<'a> {
    pending: &'a SharedPending,
    seq: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.calls.remove(&self.seq);
        }
    }
}

/// Concurrent client over a [`ClientCodec`].
///
/// Must be created inside a tokio runtime: construction spawns the reader task.
pub struct Dispatcher<C: ClientCodec> {
    codec: Arc<C>,
    next_seq: AtomicU64,
    pending: SharedPending,
    closing: AtomicBool,
}

impl<C: ClientCodec> Dispatcher<C> {
    pub fn new(codec: C) -> Self {
        let codec = Arc::new(codec);
        let pending = SharedPending::default();

        tokio::spawn(read_loop(codec.clone(), pending.clone()));

        Self { codec, next_seq: AtomicU64::new(0), pending, closing: AtomicBool::new(false) }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Number of calls registered and not yet answered.
    pub fn pending(&self) -> usize {
        lock(&self.pending).calls.len()
    }

    /// Calls `method` and decodes its result into `reply`.
    pub async fn call<P, R>(&self, method: &str, args: &P, reply: &mut R) -> Result<(), Error>
    where
        P: Params + Sync,
        R: Decode + ?Sized,
    {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = lock(&self.pending);
            if pending.shutdown || self.closing.load(Ordering::Acquire) {
                return Err(Error::Closed);
            }
            pending.calls.insert(seq, tx);
        }
        let _registered = PendingGuard { pending: &self.pending, seq };

        let header = RequestHeader { seq, method: method.to_string() };
        trace!("dispatching call {} to {}", seq, method);
        self.codec.write_request(&header, args).await?;

        let value = rx.await.map_err(|_| Error::Closed)??;
        reply.decode(value)
    }

    /// Closes the codec. Pending and later calls fail with [`Error::Closed`].
    pub fn close(&self) -> Result<(), Error> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return Err(Error::Closed);
        }
        self.codec.close()
    }
}

impl<C: ClientCodec> Drop for Dispatcher<C> {
    fn drop(&mut self) {
        if !self.closing.swap(true, Ordering::AcqRel) {
            if let Err(err) = self.codec.close() {
                warn!("failed to close codec: {}", err);
            }
        }
    }
}

async fn read_loop<C: ClientCodec>(codec: Arc<C>, pending: SharedPending) {
    loop {
        let header = match codec.read_response_header().await {
            Ok(header) => header,
            Err(err) => {
                debug!("response reader stopped: {}", err);
                break;
            }
        };
        let body = codec.read_response_body().await;
        let result = match header.error {
            Some(err) => Err(err),
            None => body,
        };

        match lock(&pending).calls.remove(&header.seq) {
            Some(call) => {
                // The caller may have given up waiting.
                let _ = call.send(result);
            }
            None => warn!("response for unknown call {}", header.seq),
        }
    }

    let mut pending = lock(&pending);
    pending.shutdown = true;
    for (_, call) in pending.calls.drain() {
        let _ = call.send(Err(Error::Closed));
    }
}
