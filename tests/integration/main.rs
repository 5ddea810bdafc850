//! Integration tests using WireMock
//!
//! These tests drive nodes over the real reqwest transport against a mock
//! token endpoint, covering request shaping, credential persistence and
//! error routing end to end.

mod consent;
mod lifecycle;
mod token_requests;

use std::sync::Arc;

use oauth2_token_node::{
    node_config, InMemoryCredentialStore, NodeConfigBuilder, NodeServices, ReqwestHttpTransport,
};
use serde_json::Value;
use wiremock::{MockServer, ResponseTemplate};

/// Helper to create a mock token endpoint
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Token endpoint URL on the mock server
pub fn token_url(server: &MockServer) -> String {
    format!("{}/token", server.uri())
}

/// Node configuration pointing at the mock server
pub fn base_config(server: &MockServer) -> NodeConfigBuilder {
    node_config()
        .id("n1")
        .access_token_url(token_url(server))
        .client_id("foo")
        .client_secret("bar")
        .scope("read")
        .status_reset_after(std::time::Duration::ZERO)
}

/// Services over the real transport and a fresh store
pub fn services() -> (NodeServices, Arc<InMemoryCredentialStore>) {
    let store = Arc::new(InMemoryCredentialStore::new());
    let transport = ReqwestHttpTransport::new().expect("transport");
    (
        NodeServices::new(store.clone(), Arc::new(transport)),
        store,
    )
}

/// Helper to create success response templates
pub fn success_response(body: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

/// Helper to create error response templates
pub fn error_response(status: u16, body: Value) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(body)
}
