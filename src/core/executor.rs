//! Token Request Executor
//!
//! Sends one token request and normalizes the outcome into a
//! [`ProviderResponse`] or an [`OAuth2Error`]. Never retries.

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;

use crate::core::{HttpRequest, HttpTransport};
use crate::error::{HttpError, OAuth2Error, OAuth2Result, TransportError};
use crate::telemetry::{Logger, TokenLogContext, TokenMetrics};
use crate::types::{ProviderResponse, RequestDescriptor};

/// Executes token requests over an injected transport.
pub struct TokenRequestExecutor {
    transport: Arc<dyn HttpTransport>,
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn TokenMetrics>,
}

impl TokenRequestExecutor {
    /// Create new executor.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        logger: Arc<dyn Logger>,
        metrics: Arc<dyn TokenMetrics>,
    ) -> Self {
        Self {
            transport,
            logger,
            metrics,
        }
    }

    /// Send the request described by `descriptor` on behalf of `node_id`.
    pub async fn execute(
        &self,
        node_id: &str,
        descriptor: &RequestDescriptor,
    ) -> OAuth2Result<ProviderResponse> {
        let grant_type = descriptor.grant_type.as_str();
        let context = TokenLogContext::new()
            .node_id(node_id)
            .operation("token_request")
            .grant_type(grant_type);

        let request = to_http_request(descriptor)?;
        if request.proxy.is_some() {
            self.logger.debug("Routing token request through proxy", &context);
        }

        self.metrics.record_token_request(node_id, grant_type);
        self.logger.debug(&format!("POST {}", descriptor.url), &context);

        let started = Instant::now();
        let result = self.transport.send(request).await;
        self.metrics
            .record_request_duration(grant_type, started.elapsed().as_secs_f64() * 1000.0);

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.logger
                    .warn(&format!("Token request failed: {}", e), &context);
                self.metrics.record_token_outcome(node_id, grant_type, false);
                self.metrics.record_error(e.error_code(), node_id);
                return Err(e);
            }
        };

        let body = parse_body(&response.body);
        if !(200..=299).contains(&response.status) {
            self.logger.warn(
                &format!("Token endpoint answered HTTP {}", response.status),
                &context,
            );
            self.metrics.record_token_outcome(node_id, grant_type, false);
            let error = OAuth2Error::Http(HttpError {
                status: response.status,
                status_text: response.status_text,
                body,
                headers: response.headers,
            });
            self.metrics.record_error(error.error_code(), node_id);
            return Err(error);
        }

        self.logger.info(
            &format!("Token endpoint answered HTTP {}", response.status),
            &context,
        );
        self.metrics.record_token_outcome(node_id, grant_type, true);

        Ok(ProviderResponse {
            status: response.status,
            status_text: response.status_text,
            headers: response.headers,
            body,
        })
    }
}

/// Wire form of a descriptor. Drops the proxy when the target is exempt.
pub fn to_http_request(descriptor: &RequestDescriptor) -> Result<HttpRequest, TransportError> {
    let target = url::Url::parse(&descriptor.url).map_err(|e| TransportError::InvalidRequest {
        message: format!("{}: {}", descriptor.url, e),
    })?;

    Ok(HttpRequest {
        method: descriptor.method,
        url: descriptor.url.clone(),
        headers: descriptor.headers.to_wire(),
        body: Some(descriptor.encoded_form()),
        timeout: Some(descriptor.timeout),
        proxy: descriptor
            .proxy
            .clone()
            .filter(|proxy| proxy.applies_to(&target)),
        tls: descriptor.tls.clone(),
    })
}

/// JSON when possible, the raw text otherwise, `{}` for an empty body.
fn parse_body(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{build_options, node_config};
    use crate::core::{HttpResponse, MockHttpTransport, ResolvedProxy};
    use crate::telemetry::{InMemoryMetrics, NoOpLogger};
    use serde_json::json;
    use std::time::Duration;

    fn descriptor() -> RequestDescriptor {
        let config = node_config()
            .access_token_url("https://auth.example.com/token")
            .client_id("foo")
            .client_secret("bar")
            .scope("read write")
            .build()
            .unwrap();
        build_options(&config, None, None).unwrap()
    }

    fn executor(transport: Arc<MockHttpTransport>) -> (TokenRequestExecutor, Arc<InMemoryMetrics>) {
        let metrics = Arc::new(InMemoryMetrics::new());
        (
            TokenRequestExecutor::new(transport, Arc::new(NoOpLogger), metrics.clone()),
            metrics,
        )
    }

    #[tokio::test]
    async fn test_success_parses_json() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(200, &json!({"access_token": "abc", "expires_in": 60}));
        let (executor, metrics) = executor(transport.clone());

        let response = executor.execute("n1", &descriptor()).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body["access_token"], json!("abc"));

        let sent = transport.get_last_request().unwrap();
        assert_eq!(sent.body.as_deref(), Some("grant_type=client_credentials&scope=read+write"));
        assert_eq!(
            sent.headers.get("Content-Type").map(String::as_str),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(sent.timeout, Some(Duration::from_secs(30)));
        assert_eq!(metrics.get_entries_by_name("oauth2_token_requests_total").len(), 1);
    }

    #[tokio::test]
    async fn test_non_2xx_is_http_error() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_response(
            HttpResponse::new(401, r#"{"error":"invalid_client"}"#)
                .with_header("WWW-Authenticate", "Basic"),
        );
        let (executor, _) = executor(transport);

        let err = executor.execute("n1", &descriptor()).await.unwrap_err();
        match err {
            OAuth2Error::Http(e) => {
                assert_eq!(e.status, 401);
                assert_eq!(e.status_text, "Unauthorized");
                assert_eq!(e.body, json!({"error": "invalid_client"}));
                assert_eq!(e.headers.get("www-authenticate").map(String::as_str), Some("Basic"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_text_and_empty_bodies() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_response(HttpResponse::new(502, "Bad Gateway"));
        transport.queue_response(HttpResponse::new(200, ""));
        let (executor, _) = executor(transport);

        let err = executor.execute("n1", &descriptor()).await.unwrap_err();
        assert!(matches!(err, OAuth2Error::Http(ref e) if e.body == json!("Bad Gateway")));

        let response = executor.execute("n1", &descriptor()).await.unwrap();
        assert_eq!(response.body, json!({}));
    }

    #[tokio::test]
    async fn test_transport_error_passes_through() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_error(TransportError::ConnectionFailed {
            message: "connection refused".into(),
        });
        let (executor, metrics) = executor(transport);

        let err = executor.execute("n1", &descriptor()).await.unwrap_err();
        assert_eq!(err.to_payload().status, json!("ECONNREFUSED"));
        assert_eq!(metrics.get_entries_by_name("oauth2_errors_total").len(), 1);
    }

    #[test]
    fn test_exempt_target_drops_proxy() {
        let mut descriptor = descriptor();
        descriptor.proxy = Some(ResolvedProxy {
            url: url::Url::parse("http://proxy:3128").unwrap(),
            no_proxy: vec!["example.com".into()],
            username: None,
            password: None,
        });
        assert!(to_http_request(&descriptor).unwrap().proxy.is_none());

        descriptor.proxy.as_mut().unwrap().no_proxy.clear();
        assert!(to_http_request(&descriptor).unwrap().proxy.is_some());
    }
}
