//! HTTP implementation of [`ClientCodec`].
//!
//! Writing a request performs the whole HTTP round trip. The response is
//! parked in a table keyed by sequence number, and the sequence number is
//! pushed onto a ready queue. The dispatcher's reader task then takes ready
//! responses one at a time:
//!
//! - the header step removes the response from the table, checks its status
//!   and looks for a fault
//! - the body step decodes the value stored by the header step
//!
//! Responses therefore reach the reader in completion order, not in the
//! order the requests were written.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use super::dispatcher::{ClientCodec, RequestHeader, ResponseHeader};
use crate::protocol::xml::{encode_method_call, Decoder, Params, Response, Value};
use crate::transport::{CookieJar, Endpoint, HttpResponse, Transport};
use crate::Error;

/// Codec carrying each call as one HTTP `POST`.
pub struct HttpCodec {
    endpoint: Endpoint,
    decoder: Decoder,
    responses: Mutex<HashMap<u64, HttpResponse>>,
    ready_tx: mpsc::UnboundedSender<u64>,
    ready_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<u64>>,
    closed: watch::Sender<bool>,
    current: Mutex<Option<Response>>,
}

impl HttpCodec {
    pub fn new(url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        let endpoint = Endpoint { url: url.into(), transport, headers: Vec::new(), cookies: None };
        Self::from_endpoint(endpoint, Decoder::default())
    }

    pub(crate) fn from_endpoint(endpoint: Endpoint, decoder: Decoder) -> Self {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        Self {
            endpoint,
            decoder,
            responses: Mutex::new(HashMap::new()),
            ready_tx,
            ready_rx: tokio::sync::Mutex::new(ready_rx),
            closed,
            current: Mutex::new(None),
        }
    }

    /// Adds a header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.endpoint.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_cookie_jar(mut self, jar: Arc<dyn CookieJar>) -> Self {
        self.endpoint.cookies = Some(jar);
        self
    }

    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Number of responses received but not yet taken by the reader.
    pub fn pending(&self) -> usize {
        self.responses.lock().expect("unable to unlock responses mutex").len()
    }

    /// Checks a ready response and keeps it for the body step.
    fn accept(&self, seq: u64, response: HttpResponse) -> ResponseHeader {
        if !response.is_success() {
            debug!("call {} rejected with status {}", seq, response.status);
            return ResponseHeader { seq, error: Some(Error::Status(response.status)) };
        }

        let response = Response::new(response.body).with_decoder(self.decoder.clone());
        match response.fault() {
            Ok(None) => {}
            Ok(Some(fault)) => return ResponseHeader { seq, error: Some(fault.into()) },
            Err(err) => return ResponseHeader { seq, error: Some(err) },
        }

        *self.current.lock().expect("unable to unlock current response mutex") = Some(response);
        ResponseHeader { seq, error: None }
    }
}

#[async_trait]
impl ClientCodec for HttpCodec {
    async fn write_request(
        &self,
        header: &RequestHeader,
        args: &(dyn Params + Sync),
    ) -> Result<(), Error> {
        let body = encode_method_call(&header.method, args)?;
        let request = self.endpoint.request(body);

        let response = self.endpoint.transport.round_trip(request).await?;
        self.endpoint.store_cookies(&response);
        trace!("call {} answered with status {}", header.seq, response.status);

        {
            let mut responses = self.responses.lock().expect("unable to unlock responses mutex");
            // Nobody reads after close, so the response would never be taken.
            if *self.closed.borrow() {
                debug!("dropping response to call {} after close", header.seq);
                return Err(Error::Closed);
            }
            responses.insert(header.seq, response);
        }
        if self.ready_tx.send(header.seq).is_err() {
            self.responses.lock().expect("unable to unlock responses mutex").remove(&header.seq);
            return Err(Error::Closed);
        }
        Ok(())
    }

    async fn read_response_header(&self) -> Result<ResponseHeader, Error> {
        let mut closed = self.closed.subscribe();
        let mut ready = self.ready_rx.lock().await;

        let seq = tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => return Err(Error::Closed),
            seq = ready.recv() => seq.ok_or(Error::Closed)?,
        };

        self.current.lock().expect("unable to unlock current response mutex").take();
        let response = self
            .responses
            .lock()
            .expect("unable to unlock responses mutex")
            .remove(&seq)
            .ok_or_else(|| Error::parse(format!("no response stored for call {seq}")))?;

        Ok(self.accept(seq, response))
    }

    async fn read_response_body(&self) -> Result<Value, Error> {
        let current = self.current.lock().expect("unable to unlock current response mutex").take();
        match current {
            Some(response) => response.value(),
            None => Ok(Value::Nil),
        }
    }

    /// Closing twice is a programming error and panics.
    fn close(&self) -> Result<(), Error> {
        self.endpoint.transport.close_idle_connections();
        if self.closed.send_replace(true) {
            panic!("xmlrpc: HttpCodec closed twice");
        }
        let dropped = {
            let mut responses = self.responses.lock().expect("unable to unlock responses mutex");
            let dropped = responses.len();
            responses.clear();
            dropped
        };
        self.current.lock().expect("unable to unlock current response mutex").take();
        debug!("http codec closed, {} unread responses dropped", dropped);
        Ok(())
    }
}
