//! Token Lifecycle
//!
//! Explicit state machine over the token held by one node:
//!
//! ```text
//! NoToken --obtain--> HasToken --invalidate--> TokenExpired
//!    ^                   ^                         |
//!    |                   +---------renew-----------+
//!    +-------------------------failed--------------+
//! ```
//!
//! Triggers in `HasToken` refresh transparently once the stored expiry has
//! passed, so callers never receive an expired token.

use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

use crate::builders::build_options_for_grant;
use crate::core::{ResolvedProxy, TokenRequestExecutor};
use crate::error::{OAuth2Result, ProtocolError, StateError};
use crate::telemetry::{Logger, TokenLogContext, TokenMetrics};
use crate::token::{CredentialStore, ResponseHandler};
use crate::types::{
    Credentials, NodeConfig, OverrideGrant, ProviderResponse, StoredToken, TokenResponse,
    TokenSummary,
};

/// Lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LifecycleState {
    #[default]
    NoToken,
    HasToken,
    TokenExpired,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoToken => "no_token",
            Self::HasToken => "has_token",
            Self::TokenExpired => "token_expired",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Event {
    Obtain,
    Invalidate,
    Renew,
    Failed,
}

impl Event {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Obtain => "obtain",
            Self::Invalidate => "invalidate",
            Self::Renew => "renew",
            Self::Failed => "failed",
        }
    }
}

/// Target state of `event` from `from`.
///
/// `obtain` is also accepted in `HasToken` so a fresh consent replaces the token.
fn next_state(from: LifecycleState, event: Event) -> Result<LifecycleState, StateError> {
    use LifecycleState::*;
    match (from, event) {
        (NoToken | HasToken, Event::Obtain) => Ok(HasToken),
        (HasToken, Event::Invalidate) => Ok(TokenExpired),
        (TokenExpired, Event::Renew) => Ok(HasToken),
        (TokenExpired, Event::Failed) => Ok(NoToken),
        (from, event) => Err(StateError::InvalidTransition {
            from: from.as_str().to_string(),
            event: event.as_str(),
        }),
    }
}

/// Token lifecycle of one node.
pub struct TokenLifecycle {
    node_id: String,
    config: Arc<NodeConfig>,
    store: Arc<dyn CredentialStore>,
    executor: Arc<TokenRequestExecutor>,
    handler: Arc<ResponseHandler>,
    metrics: Arc<dyn TokenMetrics>,
    logger: Arc<dyn Logger>,
    proxy: Option<ResolvedProxy>,
    state: AsyncMutex<LifecycleState>,
}

impl TokenLifecycle {
    /// Create new lifecycle in `NoToken`.
    pub fn new(
        config: Arc<NodeConfig>,
        store: Arc<dyn CredentialStore>,
        executor: Arc<TokenRequestExecutor>,
        handler: Arc<ResponseHandler>,
        metrics: Arc<dyn TokenMetrics>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            node_id: config.id.clone(),
            config,
            store,
            executor,
            handler,
            metrics,
            logger,
            proxy: None,
            state: AsyncMutex::new(LifecycleState::NoToken),
        }
    }

    /// Route exchanges through a proxy.
    pub fn with_proxy(mut self, proxy: Option<ResolvedProxy>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Current state.
    pub async fn state(&self) -> LifecycleState {
        *self.state.lock().await
    }

    /// Token currently on record, if any.
    pub async fn current_token(&self) -> OAuth2Result<Option<StoredToken>> {
        Ok(self
            .store
            .get(&self.node_id)
            .await?
            .as_ref()
            .and_then(StoredToken::from_credentials))
    }

    /// Exchange an authorization code. On failure the state is unchanged.
    pub async fn obtain(&self, code: &str) -> OAuth2Result<TokenSummary> {
        let mut state = self.state.lock().await;
        let target = next_state(*state, Event::Obtain)?;

        let mut credentials = self.store.get(&self.node_id).await?.unwrap_or_default();
        credentials.code = Some(code.to_string());
        self.store.put(&self.node_id, credentials.clone()).await?;

        let summary = self
            .exchange(OverrideGrant::AuthorizationCode, &credentials)
            .await?;
        self.enter(&mut state, target, Event::Obtain);
        Ok(summary)
    }

    /// Mark the held token as expired.
    pub async fn invalidate(&self) -> OAuth2Result<()> {
        let mut state = self.state.lock().await;
        self.apply(&mut state, Event::Invalidate)?;
        Ok(())
    }

    /// Refresh an expired token. On failure the state stays `TokenExpired`.
    pub async fn renew(&self) -> OAuth2Result<TokenSummary> {
        let mut state = self.state.lock().await;
        self.renew_locked(&mut state).await
    }

    /// Give up on an expired token.
    pub async fn failed(&self) -> OAuth2Result<()> {
        let mut state = self.state.lock().await;
        self.apply(&mut state, Event::Failed)?;
        Ok(())
    }

    /// Current token, refreshed first when its expiry has passed.
    ///
    /// A failed refresh moves the lifecycle back to `NoToken`.
    pub async fn trigger(&self) -> OAuth2Result<TokenSummary> {
        let mut state = self.state.lock().await;

        if *state == LifecycleState::HasToken {
            let credentials = self.store.get(&self.node_id).await?.unwrap_or_default();
            match StoredToken::from_credentials(&credentials) {
                Some(token) if !token.expired() => {
                    return Ok(self.cached_summary(&credentials, &token));
                }
                _ => {
                    self.logger.info("Stored token expired, refreshing", &self.context("trigger"));
                    self.apply(&mut state, Event::Invalidate)?;
                }
            }
        }

        let current = *state;
        match current {
            LifecycleState::NoToken => Err(StateError::NoToken.into()),
            _ => match self.renew_locked(&mut state).await {
                Ok(summary) => Ok(summary),
                Err(e) => {
                    if e.needs_reauth() {
                        self.logger.warn(
                            "Refresh token rejected, authorization required",
                            &self.context("trigger"),
                        );
                    }
                    self.apply(&mut state, Event::Failed)?;
                    Err(e)
                }
            },
        }
    }

    async fn renew_locked(&self, state: &mut LifecycleState) -> OAuth2Result<TokenSummary> {
        let target = next_state(*state, Event::Renew)?;
        let credentials = self.store.get(&self.node_id).await?.unwrap_or_default();
        let summary = self
            .exchange(
                OverrideGrant::RefreshToken {
                    refresh_token: None,
                },
                &credentials,
            )
            .await?;
        self.enter(state, target, Event::Renew);
        Ok(summary)
    }

    /// Run one exchange and persist its token.
    async fn exchange(
        &self,
        grant: OverrideGrant,
        credentials: &Credentials,
    ) -> OAuth2Result<TokenSummary> {
        let mut descriptor = build_options_for_grant(&self.config, grant, None, Some(credentials))?;
        descriptor.proxy = self.proxy.clone();

        let response = self.executor.execute(&self.node_id, &descriptor).await?;
        let token = issued_token(&response)?;
        self.handler.store_token(&self.node_id, &response).await?;

        let previous = StoredToken::from_credentials(credentials);
        let mut summary = TokenSummary::from_response(&token, previous.as_ref());
        self.attach_jwt(&mut summary, credentials);
        Ok(summary)
    }

    fn cached_summary(&self, credentials: &Credentials, token: &StoredToken) -> TokenSummary {
        let mut summary = credentials
            .oauth2_response
            .clone()
            .and_then(|body| serde_json::from_value::<TokenResponse>(body).ok())
            .map(|response| TokenSummary::from_response(&response, Some(token)))
            .unwrap_or_default();
        summary.access_token = token.access_token.clone();
        if summary.refresh_token.is_none() {
            summary.refresh_token = token.refresh_token.clone();
        }
        if let Some(remaining) = token.remaining_lifetime() {
            summary.expires_in = Some(remaining as u64);
        }
        self.attach_jwt(&mut summary, credentials);
        summary
    }

    #[cfg(feature = "jwt")]
    fn attach_jwt(&self, summary: &mut TokenSummary, credentials: &Credentials) {
        use crate::types::credentials::non_empty;
        use secrecy::ExposeSecret;

        let client_id = Some(self.config.client_id.as_str())
            .filter(|s| !s.is_empty())
            .or_else(|| non_empty(&credentials.client_id));
        let client_secret = self
            .config
            .client_secret
            .as_ref()
            .map(|s| s.expose_secret().as_str())
            .filter(|s| !s.is_empty())
            .or_else(|| non_empty(&credentials.client_secret));

        let (Some(client_id), Some(client_secret)) = (client_id, client_secret) else {
            return;
        };
        match super::jwt::mint_jwt(
            &summary.access_token,
            summary.scope.as_deref(),
            client_id,
            client_secret,
        ) {
            Ok(token) => summary.jwt_token = Some(token),
            Err(e) => self.logger.warn(&e.to_string(), &self.context("attach_jwt")),
        }
    }

    #[cfg(not(feature = "jwt"))]
    fn attach_jwt(&self, _summary: &mut TokenSummary, _credentials: &Credentials) {}

    fn apply(&self, state: &mut LifecycleState, event: Event) -> Result<(), StateError> {
        let target = next_state(*state, event)?;
        self.enter(state, target, event);
        Ok(())
    }

    fn enter(&self, state: &mut LifecycleState, target: LifecycleState, event: Event) {
        let from = *state;
        *state = target;
        self.metrics
            .record_transition(&self.node_id, from.as_str(), target.as_str());
        self.logger.debug(
            &format!("{} -> {}", from, target),
            &self.context(event.as_str()),
        );
    }

    fn context(&self, operation: &str) -> TokenLogContext {
        TokenLogContext::new()
            .node_id(&self.node_id)
            .operation(operation)
    }
}

/// Token carried by a successful exchange. Lifecycle exchanges need one.
fn issued_token(response: &ProviderResponse) -> OAuth2Result<TokenResponse> {
    response
        .token()
        .filter(|t| t.access_token.as_deref().is_some_and(|s| !s.is_empty()))
        .ok_or_else(|| {
            ProtocolError::MissingField {
                field: "access_token".to_string(),
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::node_config;
    use crate::core::MockHttpTransport;
    use crate::error::OAuth2Error;
    use crate::telemetry::{InMemoryLogger, InMemoryMetrics, LogLevel};
    use crate::token::{MockCredentialStore, NoOpStatusReporter};
    use crate::types::GrantType;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        lifecycle: TokenLifecycle,
        transport: Arc<MockHttpTransport>,
        store: Arc<MockCredentialStore>,
        metrics: Arc<InMemoryMetrics>,
        logger: Arc<InMemoryLogger>,
    }

    fn fixture() -> Fixture {
        let config = Arc::new(
            node_config()
                .id("n1")
                .grant_type(GrantType::AuthorizationCode)
                .access_token_url("https://auth.example.com/token")
                .client_id("client-1")
                .client_secret("s3cret")
                .status_reset_after(Duration::ZERO)
                .build()
                .unwrap(),
        );
        let transport = Arc::new(MockHttpTransport::new());
        let store = Arc::new(MockCredentialStore::new());
        store.add_credentials(
            "n1",
            Credentials {
                redirect_uri: Some("https://app.example.com/cb".into()),
                ..Default::default()
            },
        );
        let metrics = Arc::new(InMemoryMetrics::new());
        let logger = Arc::new(InMemoryLogger::new());
        let executor = Arc::new(TokenRequestExecutor::new(
            transport.clone(),
            logger.clone(),
            metrics.clone(),
        ));
        let handler = Arc::new(ResponseHandler::new(
            config.clone(),
            store.clone(),
            Arc::new(NoOpStatusReporter),
            logger.clone(),
        ));
        let lifecycle = TokenLifecycle::new(
            config,
            store.clone(),
            executor,
            handler,
            metrics.clone(),
            logger.clone(),
        );
        Fixture {
            lifecycle,
            transport,
            store,
            metrics,
            logger,
        }
    }

    async fn obtained(fx: &Fixture) {
        fx.transport.queue_json_response(
            200,
            &json!({"access_token": "a1", "refresh_token": "r1", "expires_in": 3600, "token_type": "Bearer"}),
        );
        fx.lifecycle.obtain("c0de").await.unwrap();
    }

    fn expire_now(store: &MockCredentialStore) {
        let mut record = store.snapshot("n1").unwrap();
        record.expire_time = Some(Utc::now().timestamp() - 3600);
        store.add_credentials("n1", record);
    }

    #[tokio::test]
    async fn test_trigger_without_token() {
        let fx = fixture();
        let err = fx.lifecycle.trigger().await.unwrap_err();
        assert!(matches!(err, OAuth2Error::State(StateError::NoToken)));
        assert!(fx.transport.get_requests().is_empty());
        assert_eq!(fx.lifecycle.state().await, LifecycleState::NoToken);
    }

    #[tokio::test]
    async fn test_obtain_exchanges_code() {
        let fx = fixture();
        obtained(&fx).await;

        assert_eq!(fx.lifecycle.state().await, LifecycleState::HasToken);
        let body = fx.transport.get_last_request().unwrap().body.unwrap();
        assert!(body.contains("grant_type=authorization_code"));
        assert!(body.contains("code=c0de"));
        assert!(body.contains("redirect_uri=https%3A%2F%2Fapp.example.com%2Fcb"));

        let token = fx.lifecycle.current_token().await.unwrap().unwrap();
        assert_eq!(token.access_token, "a1");
        assert_eq!(fx.store.snapshot("n1").unwrap().code.as_deref(), Some("c0de"));
    }

    #[tokio::test]
    async fn test_obtain_failure_keeps_no_token() {
        let fx = fixture();
        fx.transport
            .queue_json_response(400, &json!({"error": "invalid_grant"}));

        let err = fx.lifecycle.obtain("stale").await.unwrap_err();
        assert!(err.needs_reauth());
        assert_eq!(fx.lifecycle.state().await, LifecycleState::NoToken);
        assert!(fx.lifecycle.current_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_live_token_served_from_store() {
        let fx = fixture();
        obtained(&fx).await;

        let summary = fx.lifecycle.trigger().await.unwrap();
        assert_eq!(summary.access_token, "a1");
        assert_eq!(summary.refresh_token.as_deref(), Some("r1"));
        assert_eq!(fx.transport.get_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed() {
        let fx = fixture();
        obtained(&fx).await;
        expire_now(&fx.store);

        fx.transport
            .queue_json_response(200, &json!({"access_token": "a2", "expires_in": 3600}));
        let summary = fx.lifecycle.trigger().await.unwrap();

        assert_eq!(summary.access_token, "a2");
        assert_eq!(summary.refresh_token.as_deref(), Some("r1"));
        assert_eq!(fx.lifecycle.state().await, LifecycleState::HasToken);

        let refresh = fx.transport.get_last_request().unwrap().body.unwrap();
        assert!(refresh.contains("grant_type=refresh_token"));
        assert!(refresh.contains("refresh_token=r1"));

        let token = fx.lifecycle.current_token().await.unwrap().unwrap();
        assert!(!token.expired());
        assert_eq!(token.refresh_token.as_deref(), Some("r1"));

        let transitions = fx
            .metrics
            .get_entries_by_name("oauth2_lifecycle_transitions_total");
        assert_eq!(transitions.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_refresh_drops_to_no_token() {
        let fx = fixture();
        obtained(&fx).await;
        expire_now(&fx.store);

        fx.transport
            .queue_json_response(400, &json!({"error": "invalid_grant"}));
        let err = fx.lifecycle.trigger().await.unwrap_err();
        assert!(matches!(err, OAuth2Error::Http(_)));
        assert_eq!(fx.lifecycle.state().await, LifecycleState::NoToken);
        assert!(fx.logger.contains(LogLevel::Warn, "authorization required"));

        let err = fx.lifecycle.trigger().await.unwrap_err();
        assert!(matches!(err, OAuth2Error::State(StateError::NoToken)));
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let fx = fixture();
        assert!(matches!(
            fx.lifecycle.invalidate().await,
            Err(OAuth2Error::State(StateError::InvalidTransition { .. }))
        ));
        assert!(fx.lifecycle.renew().await.is_err());
        assert!(fx.lifecycle.failed().await.is_err());

        obtained(&fx).await;
        assert!(fx.lifecycle.renew().await.is_err());
        fx.lifecycle.invalidate().await.unwrap();
        assert_eq!(fx.lifecycle.state().await, LifecycleState::TokenExpired);
        fx.lifecycle.failed().await.unwrap();
        assert_eq!(fx.lifecycle.state().await, LifecycleState::NoToken);
    }

    #[tokio::test]
    async fn test_response_without_access_token_rejected() {
        let fx = fixture();
        fx.transport.queue_json_response(200, &json!({"token_type": "Bearer"}));
        let err = fx.lifecycle.obtain("c0de").await.unwrap_err();
        assert!(matches!(err, OAuth2Error::Protocol(ProtocolError::MissingField { .. })));
        assert_eq!(fx.lifecycle.state().await, LifecycleState::NoToken);
    }

    #[cfg(feature = "jwt")]
    #[tokio::test]
    async fn test_summary_carries_jwt() {
        let fx = fixture();
        obtained(&fx).await;
        let summary = fx.lifecycle.trigger().await.unwrap();
        let jwt = summary.jwt_token.unwrap();
        assert_eq!(jwt.split('.').count(), 3);
    }
}
