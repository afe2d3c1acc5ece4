#![allow(dead_code)]

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use xmlrpc_mamont::transport::{HttpRequest, HttpResponse, Transport};
use xmlrpc_mamont::xml::{CharsetReader, Decoder, Value};

type Handler = dyn Fn(&HttpRequest) -> anyhow::Result<HttpResponse> + Send + Sync;

/// In-memory server answering every request through a handler.
pub struct MockServer {
    handler: Box<Handler>,
    delay: Option<Duration>,
    requests: Mutex<Vec<HttpRequest>>,
    idle_closes: Mutex<usize>,
}

impl MockServer {
    pub fn new(
        handler: impl Fn(&HttpRequest) -> anyhow::Result<HttpResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            delay: None,
            requests: Mutex::new(Vec::new()),
            idle_closes: Mutex::new(0),
        }
    }

    /// Always answers with `status` and `body`.
    pub fn fixed(status: u16, body: &str) -> Self {
        let body = body.to_string();
        Self::new(move |_| Ok(HttpResponse::new(status, body.clone())))
    }

    /// Answers `200 OK` with a method response carrying `value_xml`.
    pub fn value(value_xml: &str) -> Self {
        Self::fixed(200, &method_response(value_xml))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests mutex").clone()
    }

    pub fn last_request(&self) -> HttpRequest {
        self.requests().pop().expect("no request was sent")
    }

    pub fn idle_closes(&self) -> usize {
        *self.idle_closes.lock().expect("idle closes mutex")
    }
}

#[async_trait]
impl Transport for MockServer {
    async fn round_trip(&self, request: HttpRequest) -> anyhow::Result<HttpResponse> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let response = (self.handler)(&request);
        self.requests.lock().expect("requests mutex").push(request);
        response
    }

    fn close_idle_connections(&self) {
        *self.idle_closes.lock().expect("idle closes mutex") += 1;
    }
}

/// Server echoing the first string parameter of each call back as its result,
/// after a delay chosen by the caller through the second parameter (milliseconds).
pub struct EchoServer;

#[async_trait]
impl Transport for EchoServer {
    async fn round_trip(&self, request: HttpRequest) -> anyhow::Result<HttpResponse> {
        let decoder = Decoder::default();
        let body = String::from_utf8(request.body)?;
        let params = body
            .split("<param>")
            .skip(1)
            .map(|param| decoder.parse(param.as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;

        let text = match params.first() {
            Some(Some(Value::String(text))) => text.clone(),
            other => anyhow::bail!("unexpected first parameter {other:?}"),
        };
        if let Some(Some(Value::Int(delay))) = params.get(1) {
            tokio::time::sleep(Duration::from_millis(*delay as u64)).await;
        }

        let reply = format!("<string>{text}</string>");
        Ok(HttpResponse::new(200, method_response(&reply)))
    }
}

/// Decodes ISO-8859-1 documents, mapping each byte to the code point of the same value.
pub struct Latin1;

impl CharsetReader for Latin1 {
    fn reader<'a>(&self, charset: &str, input: &'a [u8]) -> std::io::Result<Box<dyn Read + 'a>> {
        if !charset.eq_ignore_ascii_case("ISO-8859-1") {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                format!("unsupported charset {charset}"),
            ));
        }
        let text: String = input.iter().map(|&b| char::from(b)).collect();
        Ok(Box::new(std::io::Cursor::new(text.into_bytes())))
    }
}

pub fn shared(server: MockServer) -> Arc<MockServer> {
    Arc::new(server)
}

pub fn method_response(value_xml: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><methodResponse><params><param><value>{value_xml}</value>\
         </param></params></methodResponse>"
    )
}

pub fn fault_response(code: i64, message: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><methodResponse><fault><value><struct>\
         <member><name>faultCode</name><value><int>{code}</int></value></member>\
         <member><name>faultString</name><value><string>{message}</string></value></member>\
         </struct></value></fault></methodResponse>"
    )
}

/// Installs a test subscriber once; later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
