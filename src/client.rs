//! The client module issues XML-RPC calls over a [`Transport`].
//!
//! A call goes through the following steps:
//! - encode the method name and arguments into a `<methodCall>` document
//! - send it as one HTTP `POST`, bounded by the caller's [`CallContext`]
//! - reject any status outside `200..300`
//! - report a `<fault>` response as [`Error::Fault`]
//! - decode the result value into the caller's destination
//!
//! Each step only runs when the previous one succeeded, so every call ends
//! with exactly one outcome. [`Client`] holds no per-call state and can be
//! shared freely between tasks.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};
use tracing_attributes::instrument;

use crate::protocol::rpc::{CallContext, Dispatcher, HttpCodec, LegacyClient};
use crate::protocol::xml::{encode_method_call, CharsetReader, Decode, Decoder, Params, Response};
use crate::transport::{basic_auth, CookieJar, Endpoint, MemoryJar, Transport};
use crate::Error;

/// XML-RPC client bound to one server URL.
#[derive(Clone)]
pub struct Client {
    endpoint: Endpoint,
    decoder: Decoder,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.endpoint.url)
            .field("headers", &self.endpoint.headers.len())
            .field("decoder", &self.decoder)
            .finish()
    }
}

impl Client {
    /// Creates a client with default settings.
    pub fn new(url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self::builder(url, transport).build()
    }

    pub fn builder(url: impl Into<String>, transport: Arc<dyn Transport>) -> ClientBuilder {
        ClientBuilder {
            url: url.into(),
            transport,
            headers: Vec::new(),
            cookies: Some(Arc::new(MemoryJar::new())),
            decoder: Decoder::default(),
        }
    }

    pub fn url(&self) -> &str {
        &self.endpoint.url
    }

    /// Calls `method` with `args` and decodes the result into `reply`.
    ///
    /// The call has no deadline and cannot be cancelled.
    pub async fn call<P, R>(&self, method: &str, args: &P, reply: &mut R) -> Result<(), Error>
    where
        P: Params + ?Sized,
        R: Decode + ?Sized,
    {
        self.call_with(&CallContext::background(), method, args, reply).await
    }

    /// Calls `method` with `args` within `ctx` and decodes the result into `reply`.
    ///
    /// `reply` is only written when the call succeeds. A response without a
    /// result value leaves it untouched.
    #[instrument(skip(self, ctx, args, reply), fields(url = %self.endpoint.url))]
    pub async fn call_with<P, R>(
        &self,
        ctx: &CallContext,
        method: &str,
        args: &P,
        reply: &mut R,
    ) -> Result<(), Error>
    where
        P: Params + ?Sized,
        R: Decode + ?Sized,
    {
        let body = encode_method_call(method, args)?;
        trace!("sending {} byte request", body.len());
        let request = self.endpoint.request(body);

        let response = ctx.run(self.endpoint.transport.round_trip(request)).await??;
        self.endpoint.store_cookies(&response);

        if !response.is_success() {
            debug!("rejecting response with status {}", response.status);
            return Err(Error::Status(response.status));
        }

        let response = Response::new(response.body).with_decoder(self.decoder.clone());
        if let Some(fault) = response.fault()? {
            debug!("server reported {}", fault);
            return Err(fault.into());
        }
        response.decode_into(reply)
    }

    /// Releases idle transport connections.
    ///
    /// The client stays usable: later calls open new connections as needed.
    pub fn close(&self) {
        self.endpoint.transport.close_idle_connections();
    }
}

/// Configuration of a [`Client`].
pub struct ClientBuilder {
    url: String,
    transport: Arc<dyn Transport>,
    headers: Vec<(String, String)>,
    cookies: Option<Arc<dyn CookieJar>>,
    decoder: Decoder,
}

impl ClientBuilder {
    /// Adds a header sent verbatim with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Authenticates every request with HTTP basic authentication.
    pub fn basic_auth(self, user: &str, password: &str) -> Self {
        let value = basic_auth(user, password);
        self.header("Authorization", value)
    }

    /// Replaces the default in-memory cookie jar.
    pub fn cookie_jar(mut self, jar: Arc<dyn CookieJar>) -> Self {
        self.cookies = Some(jar);
        self
    }

    /// Disables cookie handling altogether.
    pub fn without_cookies(mut self) -> Self {
        self.cookies = None;
        self
    }

    /// Resolves responses declared in charsets other than UTF-8.
    pub fn charset_reader(mut self, charset_reader: Arc<dyn CharsetReader>) -> Self {
        self.decoder = Decoder::with_charset_reader(charset_reader);
        self
    }

    pub fn build(self) -> Client {
        let (endpoint, decoder) = self.into_parts();
        Client { endpoint, decoder }
    }

    /// Builds a concurrent [`LegacyClient`] with the same settings.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build_legacy(self) -> LegacyClient {
        let (endpoint, decoder) = self.into_parts();
        Dispatcher::new(HttpCodec::from_endpoint(endpoint, decoder))
    }

    fn into_parts(self) -> (Endpoint, Decoder) {
        let endpoint = Endpoint {
            url: self.url,
            transport: self.transport,
            headers: self.headers,
            cookies: self.cookies,
        };
        (endpoint, self.decoder)
    }
}
