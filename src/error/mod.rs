//! OAuth2 Error Types
//!
//! Error hierarchy for token acquisition plus the uniform payload shape that
//! failed exchanges are reported with on the outbound message.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Root error type for token acquisition.
#[derive(Error, Debug)]
pub enum OAuth2Error {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Authorization error: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl OAuth2Error {
    /// Get error code for telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "OAUTH2_CONFIG",
            Self::Transport(_) => "OAUTH2_TRANSPORT",
            Self::Http(_) => "OAUTH2_HTTP",
            Self::State(_) => "OAUTH2_STATE",
            Self::Authorization(_) => "OAUTH2_AUTH",
            Self::Storage(_) => "OAUTH2_STORAGE",
            Self::Protocol(_) => "OAUTH2_PROTOCOL",
        }
    }

    /// Check if error requires the user to re-run the consent flow.
    pub fn needs_reauth(&self) -> bool {
        match self {
            Self::Http(e) => matches!(e.provider_error_kind(), Some(ProviderErrorKind::InvalidGrant)),
            Self::State(StateError::NoToken) => true,
            Self::Authorization(AuthorizationError::AccessDenied { .. }) => true,
            _ => false,
        }
    }

    /// Convert into the uniform payload attached to outbound messages.
    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            Self::Http(e) => ErrorPayload {
                status: Value::from(e.status),
                message: if e.status_text.is_empty() {
                    format!("HTTP {}", e.status)
                } else {
                    e.status_text.clone()
                },
                data: e.body.clone(),
                headers: Some(e.headers.clone()),
            },
            Self::Transport(e) => ErrorPayload {
                status: Value::from(e.code()),
                message: e.to_string(),
                data: Value::Object(Map::new()),
                headers: None,
            },
            Self::State(e) => ErrorPayload {
                status: Value::from(e.http_status()),
                message: e.to_string(),
                data: Value::Object(Map::new()),
                headers: None,
            },
            other => ErrorPayload {
                status: Value::from(other.error_code()),
                message: other.to_string(),
                data: Value::Object(Map::new()),
                headers: None,
            },
        }
    }
}

/// Malformed static or per-call configuration. Never retried.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Missing required field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid endpoint URL: {url}")]
    InvalidEndpoint { url: String },

    #[error("Header {key} has malformed {kind} value: {message}")]
    InvalidHeader {
        key: String,
        kind: &'static str,
        message: String,
    },

    #[error("Invalid per-call request: {message}")]
    InvalidOverride { message: String },

    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType { grant_type: String },
}

/// Connection-level failure. Carries a transport code, never an HTTP status.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("DNS resolution failed: {host}")]
    DnsResolutionFailed { host: String },

    #[error("TLS error: {message}")]
    TlsError { message: String },

    #[error("Request could not be built: {message}")]
    InvalidRequest { message: String },
}

impl TransportError {
    /// Transport code in the style of socket error names.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "ECONNREFUSED",
            Self::Timeout { .. } => "ETIMEDOUT",
            Self::DnsResolutionFailed { .. } => "ENOTFOUND",
            Self::TlsError { .. } => "ETLS",
            Self::InvalidRequest { .. } => "EREQUEST",
        }
    }
}

/// A response was received but its status was outside 200..=299.
#[derive(Error, Debug, Clone)]
#[error("HTTP {status} {status_text}")]
pub struct HttpError {
    pub status: u16,
    pub status_text: String,
    /// Raw provider payload, parsed as JSON when possible.
    pub body: Value,
    pub headers: BTreeMap<String, String>,
}

impl HttpError {
    /// Parse the provider's `{error, error_description}` body, if present.
    pub fn provider_error(&self) -> Option<OAuth2ErrorResponse> {
        serde_json::from_value(self.body.clone()).ok()
    }

    /// Classify the provider's error code.
    pub fn provider_error_kind(&self) -> Option<ProviderErrorKind> {
        self.provider_error().map(|r| ProviderErrorKind::from_code(&r.error))
    }
}

/// Rejected admin callback or invalid lifecycle transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("State parameter mismatch (possible CSRF attack)")]
    TokenMismatch,

    #[error("No stored credentials for node {node_id}")]
    NoCredentials { node_id: String },

    #[error("Missing required parameter: {name}")]
    MissingParameter { name: String },

    #[error("Malformed state parameter: {state}")]
    MalformedState { state: String },

    #[error("No access token has been obtained")]
    NoToken,

    #[error("Transition {event} is not allowed from {from}")]
    InvalidTransition { from: String, event: &'static str },
}

impl StateError {
    /// HTTP status the admin surface answers with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::TokenMismatch => 401,
            Self::NoCredentials { .. }
            | Self::MissingParameter { .. }
            | Self::MalformedState { .. } => 400,
            Self::NoToken | Self::InvalidTransition { .. } => 409,
        }
    }
}

/// Provider-reported failure on the consent redirect.
#[derive(Error, Debug)]
pub enum AuthorizationError {
    #[error("Access denied by user")]
    AccessDenied { error_description: Option<String> },

    #[error("Authorization failed: {error}")]
    Provider {
        error: String,
        error_description: Option<String>,
    },
}

/// Storage error.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Read failed: {message}")]
    ReadFailed { message: String },

    #[error("Write failed: {message}")]
    WriteFailed { message: String },
}

/// Protocol/response interpretation error.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },
}

/// Result type for OAuth2 operations.
pub type OAuth2Result<T> = Result<T, OAuth2Error>;

/// OAuth2 error response from provider.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuth2ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_uri: Option<String>,
}

/// RFC 6749 section 5.2 error codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderErrorKind {
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    UnauthorizedClient,
    UnsupportedGrantType,
    InvalidScope,
    ServerError,
    TemporarilyUnavailable,
    Other(String),
}

impl ProviderErrorKind {
    /// Map the provider's `error` field.
    pub fn from_code(code: &str) -> Self {
        match code {
            "invalid_request" => Self::InvalidRequest,
            "invalid_client" => Self::InvalidClient,
            "invalid_grant" => Self::InvalidGrant,
            "unauthorized_client" => Self::UnauthorizedClient,
            "unsupported_grant_type" => Self::UnsupportedGrantType,
            "invalid_scope" => Self::InvalidScope,
            "server_error" => Self::ServerError,
            "temporarily_unavailable" => Self::TemporarilyUnavailable,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Uniform failure shape: `{status, message, data, headers?}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    /// HTTP status when a response arrived, otherwise a transport or error code.
    pub status: Value,
    pub message: String,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

impl ErrorPayload {
    /// Status line shown on the node, e.g. `HTTP 401, Unauthorized`.
    pub fn status_text(&self) -> String {
        let status = match &self.status {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        format!("HTTP {}, {}", status, self.message)
    }

    /// Serialize for attachment to a message.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
