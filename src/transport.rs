//! Transport module defines the interface between the XML-RPC client and the
//! HTTP stack that carries its requests.
//!
//! This module provides:
//! - The core [`Transport`] trait that performs a single HTTP round trip
//! - Plain request and response structures exchanged with the transport
//! - The [`CookieJar`] trait with an in-memory implementation
//!
//! The client never opens connections itself. Every call is turned into one
//! `POST` [`HttpRequest`] with a `text/xml` body, handed to the transport,
//! and the resulting [`HttpResponse`] is checked and decoded by the caller.
//! This keeps connection pooling, TLS and proxies outside the crate and
//! lets tests substitute an in-memory server.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::trace;

/// Outgoing HTTP request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Creates a `POST` carrying an XML document.
    pub fn xml_post(url: impl Into<String>, body: Vec<u8>) -> Self {
        let headers = vec![
            ("Content-Type".to_string(), "text/xml".to_string()),
            ("Content-Length".to_string(), body.len().to_string()),
        ];
        Self { method: "POST".to_string(), url: url.into(), headers, body }
    }

    /// Returns the first header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_values(&self.headers, name).into_iter().next()
    }

    /// Sets a header, replacing any existing values of the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }
}

/// Incoming HTTP response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self { status, headers: Vec::new(), body: body.into() }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_values(&self.headers, name).into_iter().next()
    }

    /// Whether the status is in the `2xx` range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn header_values<'a>(headers: &'a [(String, String)], name: &str) -> Vec<&'a str> {
    headers
        .iter()
        .filter(|(existing, _)| existing.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
        .collect()
}

/// HTTP collaborator performing round trips on behalf of the client.
///
/// Implementations must be safe to share between concurrent calls.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and waits for the complete response.
    ///
    /// Network failures are returned as errors. Any HTTP status, including
    /// `4xx` and `5xx`, is a successful round trip.
    async fn round_trip(&self, request: HttpRequest) -> anyhow::Result<HttpResponse>;

    /// Drops pooled connections that are not in use.
    fn close_idle_connections(&self) {}
}

/// Storage for cookies received from and sent to the server.
pub trait CookieJar: Send + Sync {
    /// Cookies to send with a request to `url`.
    fn cookies(&self, url: &str) -> Vec<(String, String)>;

    /// Stores cookies received in a response from `url`.
    fn set_cookies(&self, url: &str, cookies: Vec<(String, String)>);
}

/// Cookie jar keeping cookies in memory, per origin.
///
/// Cookie attributes such as `Path` or `Expires` are not interpreted.
#[derive(Debug, Default)]
pub struct MemoryJar {
    origins: Mutex<HashMap<String, BTreeMap<String, String>>>,
}

impl MemoryJar {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieJar for MemoryJar {
    fn cookies(&self, url: &str) -> Vec<(String, String)> {
        let origins = self.origins.lock().expect("unable to unlock cookie jar mutex");
        origins
            .get(origin(url))
            .map(|cookies| cookies.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    fn set_cookies(&self, url: &str, cookies: Vec<(String, String)>) {
        let mut origins = self.origins.lock().expect("unable to unlock cookie jar mutex");
        origins.entry(origin(url).to_string()).or_default().extend(cookies);
    }
}

/// Returns the `scheme://authority` prefix of `url`.
fn origin(url: &str) -> &str {
    let authority_start = url.find("://").map_or(0, |i| i + 3);
    match url[authority_start..].find('/') {
        Some(end) => &url[..authority_start + end],
        None => url,
    }
}

/// Parses the leading `name=value` pair of a `Set-Cookie` header.
pub fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Value of an `Authorization` header for HTTP basic authentication.
pub fn basic_auth(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

/// Shared request preparation of the synchronous client and the codec adapter.
#[derive(Clone)]
pub(crate) struct Endpoint {
    pub url: String,
    pub transport: Arc<dyn Transport>,
    pub headers: Vec<(String, String)>,
    pub cookies: Option<Arc<dyn CookieJar>>,
}

impl Endpoint {
    /// Wraps an encoded call into a request with configured headers and cookies.
    pub fn request(&self, body: Vec<u8>) -> HttpRequest {
        let mut request = HttpRequest::xml_post(self.url.clone(), body);
        for (name, value) in &self.headers {
            request.set_header(name.clone(), value.clone());
        }
        if let Some(jar) = &self.cookies {
            let cookies = jar.cookies(&self.url);
            if !cookies.is_empty() {
                let header: Vec<String> =
                    cookies.iter().map(|(name, value)| format!("{name}={value}")).collect();
                request.set_header("Cookie", header.join("; "));
            }
        }
        request
    }

    /// Stores the `Set-Cookie` headers of `response` in the jar, if one is configured.
    pub fn store_cookies(&self, response: &HttpResponse) {
        let Some(jar) = &self.cookies else {
            return;
        };
        let cookies: Vec<(String, String)> = header_values(&response.headers, "Set-Cookie")
            .into_iter()
            .filter_map(parse_set_cookie)
            .collect();
        if !cookies.is_empty() {
            trace!("storing {} cookies for {}", cookies.len(), self.url);
            jar.set_cookies(&self.url, cookies);
        }
    }
}
