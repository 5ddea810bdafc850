//! Integration tests for the token lifecycle

use super::*;
use oauth2_token_node::{CredentialStore, Dispatch, GrantType, LifecycleState, OAuth2Node};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::Mock;

#[tokio::test]
async fn test_expired_token_refreshed_on_trigger() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=c0de"))
        .respond_with(success_response(json!({
            "access_token": "a1",
            "refresh_token": "r1",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r1"))
        .respond_with(success_response(json!({"access_token": "a2", "expires_in": 3600})))
        .expect(1)
        .mount(&server)
        .await;

    let (services, store) = services();
    let config = assert_ok!(base_config(&server)
        .grant_type(GrantType::AuthorizationCode)
        .build());
    let node = OAuth2Node::new(config, services).lifecycle();

    let summary = assert_ok!(node.obtain("c0de").await);
    assert_eq!(summary.access_token, "a1");
    assert_eq!(node.lifecycle().state().await, LifecycleState::HasToken);

    let mut record = assert_ok!(store.get("n1").await).unwrap();
    record.expire_time = Some(chrono::Utc::now().timestamp() - 3600);
    assert_ok!(store.put("n1", record).await);

    let message = match node.on_input(json!({"topic": "t"})).await {
        Dispatch::Send { message, .. } => message,
        other => panic!("expected a send, got {:?}", other),
    };
    assert_eq!(message["payload"]["accessToken"], json!("a2"));
    assert_eq!(message["payload"]["refreshToken"], json!("r1"));
    assert_eq!(node.lifecycle().state().await, LifecycleState::HasToken);

    let token = assert_ok!(node.lifecycle().current_token().await).unwrap();
    assert!(!token.expired());
}

#[tokio::test]
async fn test_failed_refresh_produces_no_output() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(success_response(json!({
            "access_token": "a1",
            "refresh_token": "r1",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(error_response(400, json!({"error": "invalid_grant"})))
        .mount(&server)
        .await;

    let (services, store) = services();
    let config = assert_ok!(base_config(&server)
        .grant_type(GrantType::AuthorizationCode)
        .build());
    let node = OAuth2Node::new(config, services).lifecycle();
    assert_ok!(node.obtain("c0de").await);

    let mut record = assert_ok!(store.get("n1").await).unwrap();
    record.expire_time = Some(chrono::Utc::now().timestamp() - 1);
    assert_ok!(store.put("n1", record).await);

    assert_eq!(node.on_input(json!({})).await, Dispatch::Drop);
    assert_eq!(node.lifecycle().state().await, LifecycleState::NoToken);
    assert_err!(node.lifecycle().trigger().await);
}
