//! Token Management
//!
//! Everything that happens once the token endpoint has answered.
//!
//! This module provides:
//!
//! - **Credential Storage**: adapter over the host's per-node credential store
//! - **Response Handler**: credential updates, status and routing of outcomes
//! - **Token Lifecycle**: explicit state machine with refresh-on-expiry
//! - **Summary JWTs**: optional HS256 token wrapping the access token

pub mod handler;
#[cfg(feature = "jwt")]
pub mod jwt;
pub mod lifecycle;
pub mod storage;

// Credential Storage
pub use storage::{
    create_in_memory_credential_store, create_mock_credential_store, CredentialStore,
    InMemoryCredentialStore, MockCredentialStore,
};

// Response Handler
pub use handler::{
    Dispatch, NoOpStatusReporter, NodeStatus, Output, ResponseHandler, StatusFill,
    StatusReporter, HEADERS_FIELD,
};

// Token Lifecycle
pub use lifecycle::{LifecycleState, TokenLifecycle};

#[cfg(feature = "jwt")]
pub use jwt::{mint_jwt, SummaryClaims, JWT_ISSUER, JWT_LIFETIME_SECS};
