//! Authorization Code Consent
//!
//! Library side of the admin endpoints that drive a browser consent for
//! authorization-code nodes: start the consent, verify the provider
//! callback, capture the returned code and hand it back to the editor.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

use crate::core::{generate_csrf_token, StateParam};
use crate::error::{AuthorizationError, ConfigError, OAuth2Error, StateError};
use crate::telemetry::{Logger, TokenLogContext};
use crate::token::CredentialStore;
use crate::types::credentials::non_empty;
use crate::types::{AuthRedirect, AuthRequestQuery, CallbackQuery, CodeGrant, Credentials};

/// Admin operations of the consent flow.
#[async_trait]
pub trait AuthorizationAdmin: Send + Sync {
    /// Start a consent: persist the pending credentials and build the
    /// provider authorization URL.
    async fn begin(&self, query: AuthRequestQuery) -> Result<AuthRedirect, OAuth2Error>;

    /// Verify the provider callback against the pending consent.
    async fn callback(&self, query: &CallbackQuery) -> Result<String, OAuth2Error>;

    /// Store the code delivered by the consent redirect.
    async fn redirect(&self, query: &CallbackQuery) -> Result<String, OAuth2Error>;

    /// Code and redirect URI captured for a node.
    async fn credentials(&self, node_id: &str) -> Result<CodeGrant, OAuth2Error>;
}

/// Consent flow over a credential store.
pub struct AuthorizationAdminImpl {
    store: Arc<dyn CredentialStore>,
    logger: Arc<dyn Logger>,
}

impl AuthorizationAdminImpl {
    /// Create new consent flow.
    pub fn new(store: Arc<dyn CredentialStore>, logger: Arc<dyn Logger>) -> Self {
        Self { store, logger }
    }

    async fn stored(&self, node_id: &str) -> Result<Credentials, OAuth2Error> {
        self.store
            .get(node_id)
            .await?
            .ok_or_else(|| no_credentials(node_id))
    }
}

#[async_trait]
impl AuthorizationAdmin for AuthorizationAdminImpl {
    async fn begin(&self, query: AuthRequestQuery) -> Result<AuthRedirect, OAuth2Error> {
        if let Some(name) = query.missing_parameter() {
            return Err(StateError::MissingParameter {
                name: name.to_string(),
            }
            .into());
        }

        let endpoint = query.authorization_endpoint.clone().unwrap_or_default();
        let mut url = Url::parse(&endpoint).map_err(|_| ConfigError::InvalidEndpoint {
            url: endpoint.clone(),
        })?;

        let node_id = query.id.clone().unwrap_or_default();
        let csrf_token = generate_csrf_token();
        let state = StateParam::new(node_id.as_str(), csrf_token.as_str()).to_string();

        url.query_pairs_mut()
            .append_pair("client_id", query.client_id.as_deref().unwrap_or_default())
            .append_pair("redirect_uri", query.redirect_uri.as_deref().unwrap_or_default())
            .append_pair("state", &state)
            .append_pair("scope", query.scope.as_deref().unwrap_or_default())
            .append_pair("resource", query.resource.as_deref().unwrap_or_default())
            .append_pair("response_type", "code");

        let mut extra = query.extra;
        for (key, value) in [
            ("id", &query.id),
            ("callback", &query.callback),
            ("scope", &query.scope),
            ("resource", &query.resource),
            ("authorizationEndpoint", &query.authorization_endpoint),
        ] {
            if let Some(value) = value {
                extra.insert(key.to_string(), Value::String(value.clone()));
            }
        }

        let pending = Credentials {
            client_id: query.client_id,
            client_secret: query.client_secret,
            redirect_uri: query.redirect_uri,
            csrf_token: Some(csrf_token.clone()),
            extra: extra.into_iter().collect(),
            ..Default::default()
        };
        self.store.put(&node_id, pending).await?;

        self.logger.info(
            "Authorization consent started",
            &TokenLogContext::new()
                .node_id(node_id.as_str())
                .operation("begin")
                .extra("authorization_endpoint", endpoint),
        );

        Ok(AuthRedirect {
            url,
            csrf_token,
            state,
        })
    }

    async fn callback(&self, query: &CallbackQuery) -> Result<String, OAuth2Error> {
        if let Some(error) = &query.error {
            let error_description = query.error_description.clone();
            return Err(match error.as_str() {
                "access_denied" => AuthorizationError::AccessDenied { error_description },
                _ => AuthorizationError::Provider {
                    error: error.clone(),
                    error_description,
                },
            }
            .into());
        }

        let state = query.state.as_deref().ok_or_else(|| StateError::MissingParameter {
            name: "state".to_string(),
        })?;
        let state = StateParam::parse(state)?;

        let credentials = self.stored(&state.node_id).await?;
        if !credentials.has_client() {
            return Err(no_credentials(&state.node_id));
        }

        if let Err(e) = state.verify(non_empty(&credentials.csrf_token)) {
            self.logger.warn(
                "Rejected consent callback with mismatched state",
                &TokenLogContext::new()
                    .node_id(state.node_id.as_str())
                    .operation("callback"),
            );
            return Err(e.into());
        }
        Ok(state.node_id)
    }

    async fn redirect(&self, query: &CallbackQuery) -> Result<String, OAuth2Error> {
        let state = query.state.as_deref().unwrap_or_default();
        let node_id = StateParam::node_id_of(state)
            .ok_or_else(|| StateError::MissingParameter {
                name: "state".to_string(),
            })?
            .to_string();

        let code = non_empty(&query.code)
            .ok_or_else(|| no_credentials(&node_id))?
            .to_string();

        let mut credentials = self.stored(&node_id).await?;
        credentials.code = Some(code);
        self.store.put(&node_id, credentials).await?;

        self.logger.info(
            "Authorization code captured",
            &TokenLogContext::new()
                .node_id(node_id.as_str())
                .operation("redirect"),
        );
        Ok(node_id)
    }

    async fn credentials(&self, node_id: &str) -> Result<CodeGrant, OAuth2Error> {
        let credentials = self.stored(node_id).await?;
        Ok(CodeGrant {
            code: credentials.code,
            redirect_uri: credentials.redirect_uri,
        })
    }
}

fn no_credentials(node_id: &str) -> OAuth2Error {
    StateError::NoCredentials {
        node_id: node_id.to_string(),
    }
    .into()
}

/// Create consent flow over a credential store.
pub fn create_authorization_admin(
    store: Arc<dyn CredentialStore>,
    logger: Arc<dyn Logger>,
) -> AuthorizationAdminImpl {
    AuthorizationAdminImpl::new(store, logger)
}
