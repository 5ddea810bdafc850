//! OAuth2 Token Node
//!
//! Token acquisition and refresh engine for flow-based automation hosts.
//!
//! # Features
//!
//! - Client Credentials Grant (RFC 6749 Section 4.4)
//! - Resource Owner Password Grant (RFC 6749 Section 4.3)
//! - Authorization Code Grant with browser consent (RFC 6749 Section 4.1)
//! - Token Refresh (RFC 6749 Section 6)
//! - Per-message request overrides (`oauth2Request`)
//! - Proxy resolution with `no_proxy` exemptions
//! - Explicit token lifecycle with refresh-on-expiry
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use oauth2_token_node::{node_config, InMemoryCredentialStore, NodeServices, OAuth2Node};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = node_config()
//!         .id("node-1")
//!         .access_token_url("https://provider.com/oauth/token")
//!         .client_id("my-client-id")
//!         .client_secret("my-client-secret")
//!         .scope("read")
//!         .build()?;
//!
//!     let services = NodeServices::with_reqwest(Arc::new(InMemoryCredentialStore::new()))?;
//!     let node = OAuth2Node::new(config, services);
//!
//!     let dispatch = node.on_input(serde_json::json!({"topic": "token"})).await;
//!     println!("{:?}", dispatch.message());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: configuration, credentials, overrides and token data
//! - `error`: error hierarchy and the uniform error payload
//! - `core`: transport, proxy resolution, request execution, exchange guards
//! - `builders`: node configuration builder and the request options builder
//! - `token`: credential storage, response handling, token lifecycle
//! - `flows`: authorization-code consent for the admin surface
//! - `telemetry`: logging and metrics
//! - `node`: host-facing node combining all of the above

pub mod builders;
pub mod core;
pub mod error;
pub mod flows;
pub mod node;
pub mod telemetry;
pub mod token;
pub mod types;

// Re-export main node
pub use node::{LifecycleNode, NodeServices, OAuth2Node, PAYLOAD_FIELD};

// Re-export builders
pub use builders::{build_options, build_options_for_grant, node_config, NodeConfigBuilder};

// Re-export errors
pub use error::{
    AuthorizationError, ConfigError, ErrorPayload, HttpError, OAuth2Error, OAuth2ErrorResponse,
    OAuth2Result, ProtocolError, ProviderErrorKind, StateError, StorageError, TransportError,
};

// Re-export types
pub use types::{
    // Config
    ErrorHandling, GrantType, HeaderSpec, HeaderValueType, NodeConfig, TlsMaterial,
    DEFAULT_CONTAINER, DEFAULT_EXPIRES_IN, DEFAULT_STATUS_RESET,
    DEFAULT_TIMEOUT,
    // Credentials
    Credentials,
    // Overrides
    OverrideCredentials, OverrideGrant, RequestOverride, OVERRIDE_FIELD,
    // Proxy
    EnvironmentSnapshot, ProxyConfig, ProxyCredentials,
    // Request
    HeaderValue, RequestDescriptor, RequestHeaders, TlsPolicy,
    // Token
    ProviderResponse, StoredToken, TokenResponse, TokenSummary,
    // Callback
    AuthRedirect, AuthRequestQuery, CallbackQuery, CodeGrant,
};

// Re-export core components
pub use core::{
    // Transport
    create_mock_transport, create_transport, HttpMethod, HttpRequest, HttpResponse,
    HttpTransport, MockHttpTransport, ReqwestHttpTransport,
    // Execution
    to_http_request, TokenRequestExecutor,
    // Proxy
    resolve_proxy, ResolvedProxy,
    // State
    generate_csrf_token, StateParam,
    // Guards
    FlightGuards,
};

// Re-export flows
pub use flows::{create_authorization_admin, AuthorizationAdmin, AuthorizationAdminImpl};

// Re-export token management
pub use token::{
    // Storage
    create_in_memory_credential_store, create_mock_credential_store, CredentialStore,
    InMemoryCredentialStore, MockCredentialStore,
    // Handler
    Dispatch, NoOpStatusReporter, NodeStatus, Output, ResponseHandler, StatusFill,
    StatusReporter,
    // Lifecycle
    LifecycleState, TokenLifecycle,
};

// Re-export telemetry
pub use telemetry::{
    // Metrics
    create_in_memory_metrics, no_op_metrics, InMemoryMetrics, MetricEntry, MetricLabels,
    NoOpMetrics, TokenMetrics,
    // Logging
    create_in_memory_logger, create_tracing_logger, no_op_logger, InMemoryLogger, LogEntry,
    LogLevel, Logger, NoOpLogger, TokenLogContext, TracingLogger,
};
