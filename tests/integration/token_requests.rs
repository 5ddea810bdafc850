//! Integration tests for per-message token requests

use super::*;
use oauth2_token_node::{
    CredentialStore, Dispatch, ErrorHandling, FlightGuards, GrantType, HeaderValueType,
    OAuth2Node, Output, ProxyConfig,
};
use serde_json::json;
use tokio_test::assert_ok;
use wiremock::matchers::{body_string, body_string_contains, header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn sent(dispatch: Dispatch) -> (Output, Value) {
    match dispatch {
        Dispatch::Send { output, message } => (output, message),
        other => panic!("expected a send, got {:?}", other),
    }
}

#[tokio::test]
async fn test_client_credentials_success() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("authorization", "Basic Zm9vOmJhcg=="))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string("grant_type=client_credentials&scope=read"))
        .respond_with(
            success_response(json!({
                "access_token": "abc",
                "expires_in": 3600,
                "token_type": "Bearer"
            }))
            .insert_header("x-request-id", "42"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (services, store) = services();
    let config = assert_ok!(base_config(&server).include_response_headers(true).build());
    let node = OAuth2Node::new(config, services);

    let (output, message) = sent(node.on_input(json!({"topic": "t"})).await);
    assert_eq!(output, Output::Primary);
    assert_eq!(message["oauth2Response"]["access_token"], json!("abc"));
    assert_eq!(message["headers"]["x-request-id"], json!("42"));
    assert_eq!(message["topic"], json!("t"));

    let stored = assert_ok!(store.get("n1").await).expect("credentials stored");
    assert_eq!(stored.access_token.as_deref(), Some("abc"));
    let expected = chrono::Utc::now().timestamp() + 3600;
    assert!((stored.expire_time.unwrap() - expected).abs() <= 5);
}

#[tokio::test]
async fn test_credentials_in_body() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("client_id=foo"))
        .and(body_string_contains("client_secret=bar"))
        .respond_with(success_response(json!({"access_token": "abc"})))
        .expect(1)
        .mount(&server)
        .await;

    let (services, _) = services();
    let config = assert_ok!(base_config(&server).client_credentials_in_body(true).build());
    let node = OAuth2Node::new(config, services);

    let (_, message) = sent(node.on_input(json!({})).await);
    assert_eq!(message["oauth2Response"]["access_token"], json!("abc"));

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_override_password_grant_with_headers() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/other/token"))
        .and(header("x-tenant", "acme"))
        .and(header("x-static", "7"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("username=u"))
        .and(body_string_contains("password=p"))
        .respond_with(success_response(json!({"access_token": "pw-token"})))
        .expect(1)
        .mount(&server)
        .await;

    let (services, _) = services();
    let config = assert_ok!(base_config(&server)
        .header("X-Static", "7", HeaderValueType::Num)
        .build());
    let node = OAuth2Node::new(config, services);

    let (_, message) = sent(
        node.on_input(json!({
            "oauth2Request": {
                "access_token_url": format!("{}/other/token", server.uri()),
                "headers": {"X-Tenant": "acme"},
                "credentials": {
                    "grant_type": "password",
                    "username": "u",
                    "password": "p"
                }
            }
        }))
        .await,
    );
    assert!(message.get("oauth2Request").is_none());
    assert_eq!(message["oauth2Response"]["access_token"], json!("pw-token"));
}

#[tokio::test]
async fn test_unauthorized_routing() {
    for (policy, expected) in [
        (ErrorHandling::Inline, Some(Output::Primary)),
        (ErrorHandling::OtherOutput, Some(Output::Secondary)),
        (ErrorHandling::Throw, None),
    ] {
        let server = setup_mock_server().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(error_response(401, json!({"error": "invalid_client"})))
            .mount(&server)
            .await;

        let (services, store) = services();
        let config = assert_ok!(base_config(&server).error_handling(policy).build());
        let node = OAuth2Node::new(config, services);

        match (node.on_input(json!({"payload": "x"})).await, expected) {
            (Dispatch::Send { output, message }, Some(want)) => {
                assert_eq!(output, want);
                assert_eq!(message["oauth2Response"]["status"], json!(401));
                assert_eq!(message["oauth2Response"]["message"], json!("Unauthorized"));
                assert_eq!(message["oauth2Response"]["data"]["error"], json!("invalid_client"));
                assert_eq!(message["payload"], json!("x"));
            }
            (Dispatch::Escalate { error, .. }, None) => {
                assert_eq!(error.status_text(), "HTTP 401, Unauthorized");
            }
            (other, want) => panic!("policy {:?}: got {:?}, want {:?}", policy, other, want),
        }
        assert!(assert_ok!(store.get("n1").await).is_none());
    }
}

#[tokio::test]
async fn test_text_error_body() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let (services, _) = services();
    let node = OAuth2Node::new(assert_ok!(base_config(&server).build()), services);

    let (_, message) = sent(node.on_input(json!({})).await);
    assert_eq!(message["oauth2Response"]["status"], json!(503));
    assert_eq!(message["oauth2Response"]["data"], json!("maintenance"));
}

#[tokio::test]
async fn test_redirects_are_not_followed() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", format!("{}/elsewhere", server.uri())),
        )
        .mount(&server)
        .await;

    let (services, _) = services();
    let node = OAuth2Node::new(assert_ok!(base_config(&server).build()), services);

    let (_, message) = sent(node.on_input(json!({})).await);
    assert_eq!(message["oauth2Response"]["status"], json!(302));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unreachable_endpoint_reports_transport_code() {
    let (services, _) = services();
    let config = assert_ok!(node_config()
        .id("n1")
        .access_token_url("http://127.0.0.1:1/token")
        .client_id("foo")
        .client_secret("bar")
        .timeout(std::time::Duration::from_secs(5))
        .status_reset_after(std::time::Duration::ZERO)
        .build());
    let node = OAuth2Node::new(config, services);

    let (_, message) = sent(node.on_input(json!({})).await);
    assert!(message["oauth2Response"]["status"].is_string());
    assert!(message["oauth2Response"].get("headers").is_none());
}

#[tokio::test]
async fn test_malformed_proxy_does_not_abort() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(success_response(json!({"access_token": "abc"})))
        .expect(1)
        .mount(&server)
        .await;

    let (services, _) = services();
    let config = assert_ok!(base_config(&server)
        .proxy(ProxyConfig::new("::not a proxy::"))
        .build());
    let node = OAuth2Node::new(config, services);

    let (output, message) = sent(node.on_input(json!({})).await);
    assert_eq!(output, Output::Primary);
    assert_eq!(message["oauth2Response"]["access_token"], json!("abc"));
}

#[tokio::test]
async fn test_no_proxy_exempts_target() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(success_response(json!({"access_token": "abc"})))
        .expect(1)
        .mount(&server)
        .await;

    let (services, _) = services();
    let config = assert_ok!(base_config(&server)
        .proxy(ProxyConfig::new("http://127.0.0.1:9").with_no_proxy(vec!["127.0.0.1".into()]))
        .build());
    let node = OAuth2Node::new(config, services);

    let (_, message) = sent(node.on_input(json!({})).await);
    assert_eq!(message["oauth2Response"]["access_token"], json!("abc"));
}

#[tokio::test]
async fn test_refresh_grant_keeps_refresh_token() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r1"))
        .respond_with(success_response(json!({"access_token": "a2", "expires_in": 60})))
        .expect(1)
        .mount(&server)
        .await;

    let (services, store) = services();
    store
        .put(
            "n1",
            oauth2_token_node::Credentials {
                refresh_token: Some("r1".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let config = assert_ok!(base_config(&server).grant_type(GrantType::RefreshToken).build());
    let node = OAuth2Node::new(config, services);

    node.on_input(json!({})).await;
    let stored = assert_ok!(store.get("n1").await).unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("a2"));
    assert_eq!(stored.refresh_token.as_deref(), Some("r1"));
}

#[tokio::test]
async fn test_concurrent_triggers_all_complete() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .respond_with(
            success_response(json!({"access_token": "abc"}))
                .set_delay(std::time::Duration::from_millis(20)),
        )
        .expect(3)
        .mount(&server)
        .await;

    let (services, _) = services();
    let guards = FlightGuards::new();
    let node = Arc::new(OAuth2Node::new(
        assert_ok!(base_config(&server).build()),
        services.with_guards(guards.clone()),
    ));

    let tasks: Vec<_> = (0..3)
        .map(|i| {
            let node = node.clone();
            tokio::spawn(async move { node.on_input(json!({"n": i})).await })
        })
        .collect();
    for task in tasks {
        let (output, _) = sent(task.await.unwrap());
        assert_eq!(output, Output::Primary);
    }
    assert_eq!(guards.len(), 1);
}
