//! HTTP Transport
//!
//! HTTP client interface and implementations for token requests.

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::core::ResolvedProxy;
use crate::error::{OAuth2Error, ProtocolError, TransportError};
use crate::types::{TlsPolicy, DEFAULT_TIMEOUT};

/// Upper bound on a token endpoint response body.
pub const MAX_RESPONSE_SIZE: usize = 1024 * 1024;

/// HTTP request definition.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Request URL.
    pub url: String,
    /// Request headers.
    pub headers: BTreeMap<String, String>,
    /// Request body.
    pub body: Option<String>,
    /// Request timeout.
    pub timeout: Option<Duration>,
    /// Proxy to route through, already checked against the no-proxy list.
    pub proxy: Option<ResolvedProxy>,
    pub tls: TlsPolicy,
}

impl HttpRequest {
    /// Create a POST request with default TLS and no proxy.
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout: None,
            proxy: None,
            tls: TlsPolicy::default(),
        }
    }
}

/// HTTP method.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// HTTP response definition.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Status text.
    pub status_text: String,
    /// Response headers, lowercased names.
    pub headers: BTreeMap<String, String>,
    /// Response body.
    pub body: String,
}

impl HttpResponse {
    /// Create a response with the canonical reason phrase.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            status_text: reason_phrase(status).to_string(),
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }
}

fn reason_phrase(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
}

/// HTTP transport interface (for dependency injection).
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send an HTTP request.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, OAuth2Error>;
}

/// Default reqwest-based HTTP transport.
///
/// Requests without proxy and with default TLS share one client. Others get a
/// client built for their proxy and trust settings.
pub struct ReqwestHttpTransport {
    client: reqwest::Client,
    default_timeout: Duration,
    max_response_size: usize,
}

impl ReqwestHttpTransport {
    /// Create new transport with default settings.
    pub fn new() -> Result<Self, OAuth2Error> {
        Self::with_options(DEFAULT_TIMEOUT, MAX_RESPONSE_SIZE)
    }

    /// Create transport with custom options.
    pub fn with_options(timeout: Duration, max_response_size: usize) -> Result<Self, OAuth2Error> {
        let client = build_client(None, &TlsPolicy::default())?;
        Ok(Self {
            client,
            default_timeout: timeout,
            max_response_size,
        })
    }

    fn client_for(&self, request: &HttpRequest) -> Result<reqwest::Client, TransportError> {
        if request.proxy.is_none() && request.tls.is_default() {
            return Ok(self.client.clone());
        }
        build_client(request.proxy.as_ref(), &request.tls)
    }
}

fn build_client(
    proxy: Option<&ResolvedProxy>,
    tls: &TlsPolicy,
) -> Result<reqwest::Client, TransportError> {
    // Token endpoints must answer directly.
    let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());

    builder = match proxy {
        Some(proxy) => {
            let mut reqwest_proxy =
                reqwest::Proxy::all(proxy.url.as_str()).map_err(|e| TransportError::InvalidRequest {
                    message: format!("invalid proxy: {}", e),
                })?;
            if let Some(username) = &proxy.username {
                reqwest_proxy =
                    reqwest_proxy.basic_auth(username, proxy.password.as_deref().unwrap_or(""));
            }
            builder.proxy(reqwest_proxy)
        }
        // Proxy environment variables are resolved explicitly, never implicitly.
        None => builder.no_proxy(),
    };

    if !tls.reject_unauthorized {
        builder = builder.danger_accept_invalid_certs(true);
    }

    if let Some(material) = &tls.material {
        if let Some(ca) = &material.ca_pem {
            let cert = reqwest::Certificate::from_pem(ca.as_bytes()).map_err(tls_error)?;
            builder = builder.add_root_certificate(cert);
        }
        if let (Some(cert), Some(key)) = (&material.cert_pem, &material.key_pem) {
            let pem = format!("{}\n{}", cert.trim_end(), key);
            let identity = reqwest::Identity::from_pem(pem.as_bytes()).map_err(tls_error)?;
            builder = builder.identity(identity);
        }
    }

    builder.build().map_err(|e| {
        if tls.material.is_some() {
            tls_error(e)
        } else {
            TransportError::InvalidRequest {
                message: e.to_string(),
            }
        }
    })
}

fn tls_error(e: reqwest::Error) -> TransportError {
    TransportError::TlsError {
        message: e.to_string(),
    }
}

/// Flatten an error and its sources into one line.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

fn map_send_error(error: reqwest::Error, timeout: Duration, url: &str) -> TransportError {
    if error.is_timeout() {
        return TransportError::Timeout { timeout };
    }
    if error.is_builder() {
        return TransportError::InvalidRequest {
            message: error.to_string(),
        };
    }

    let message = error_chain(&error);
    let lower = message.to_ascii_lowercase();
    if lower.contains("dns error") || lower.contains("failed to lookup address") {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(String::from))
            .unwrap_or_else(|| url.to_string());
        TransportError::DnsResolutionFailed { host }
    } else if lower.contains("certificate") || lower.contains("tls") || lower.contains("handshake") {
        TransportError::TlsError { message }
    } else {
        TransportError::ConnectionFailed { message }
    }
}

#[async_trait]
impl HttpTransport for ReqwestHttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, OAuth2Error> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let client = self.client_for(&request)?;

        let mut req_builder = match request.method {
            HttpMethod::Get => client.get(&request.url),
            HttpMethod::Post => client.post(&request.url),
        };

        for (key, value) in &request.headers {
            req_builder = req_builder.header(key, value);
        }

        if let Some(body) = request.body {
            req_builder = req_builder.body(body);
        }

        let response = req_builder
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_send_error(e, timeout, &request.url))?;

        let status = response.status().as_u16();
        let status_text = response
            .status()
            .canonical_reason()
            .unwrap_or("")
            .to_string();

        let mut headers = BTreeMap::new();
        for (key, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(key.as_str().to_ascii_lowercase(), v.to_string());
            }
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_response_size {
                return Err(ProtocolError::InvalidResponse {
                    message: format!("response too large: {} bytes", len),
                }
                .into());
            }
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                OAuth2Error::Transport(TransportError::Timeout { timeout })
            } else {
                OAuth2Error::Protocol(ProtocolError::InvalidResponse {
                    message: e.to_string(),
                })
            }
        })?;

        if body.len() > self.max_response_size {
            return Err(ProtocolError::InvalidResponse {
                message: format!("response too large: {} bytes", body.len()),
            }
            .into());
        }

        Ok(HttpResponse {
            status,
            status_text,
            headers,
            body,
        })
    }
}

/// Mock HTTP transport for testing.
///
/// Replies are handed out in the order they were queued.
#[derive(Default)]
pub struct MockHttpTransport {
    replies: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    request_history: Mutex<Vec<HttpRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockHttpTransport {
    /// Create new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response to return.
    pub fn queue_response(&self, response: HttpResponse) -> &Self {
        lock(&self.replies).push_back(Ok(response));
        self
    }

    /// Queue a JSON response.
    pub fn queue_json_response<T: serde::Serialize>(&self, status: u16, body: &T) -> &Self {
        let response = HttpResponse::new(status, serde_json::to_string(body).unwrap_or_default())
            .with_header("content-type", "application/json");
        self.queue_response(response)
    }

    /// Queue a connection-level failure.
    pub fn queue_error(&self, error: TransportError) -> &Self {
        lock(&self.replies).push_back(Err(error));
        self
    }

    /// Get request history.
    pub fn get_requests(&self) -> Vec<HttpRequest> {
        lock(&self.request_history).clone()
    }

    /// Get last request.
    pub fn get_last_request(&self) -> Option<HttpRequest> {
        lock(&self.request_history).last().cloned()
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, OAuth2Error> {
        lock(&self.request_history).push(request);

        let reply = lock(&self.replies).pop_front();
        match reply {
            Some(reply) => reply.map_err(OAuth2Error::from),
            None => Err(TransportError::ConnectionFailed {
                message: "No mock response available".to_string(),
            }
            .into()),
        }
    }
}

/// Create production HTTP transport.
pub fn create_transport(timeout: Option<Duration>) -> Result<ReqwestHttpTransport, OAuth2Error> {
    ReqwestHttpTransport::with_options(timeout.unwrap_or(DEFAULT_TIMEOUT), MAX_RESPONSE_SIZE)
}

/// Create mock HTTP transport for testing.
pub fn create_mock_transport() -> MockHttpTransport {
    MockHttpTransport::new()
}
