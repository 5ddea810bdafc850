//! Configuration Builder
//!
//! Fluent builder for node configuration.

use std::time::Duration;

use crate::error::ConfigError;
use crate::types::{
    ErrorHandling, GrantType, HeaderSpec, HeaderValueType, NodeConfig, ProxyConfig, TlsMaterial,
};
use secrecy::SecretString;

/// Node configuration builder.
#[derive(Default)]
pub struct NodeConfigBuilder {
    config: NodeConfig,
}

impl NodeConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set node id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    /// Set display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set grant type.
    pub fn grant_type(mut self, grant_type: GrantType) -> Self {
        self.config.grant_type = grant_type;
        self
    }

    /// Set token endpoint.
    pub fn access_token_url(mut self, url: impl Into<String>) -> Self {
        self.config.access_token_url = url.into();
        self
    }

    /// Set client ID.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.client_id = client_id.into();
        self
    }

    /// Set client secret.
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.config.client_secret = Some(SecretString::new(client_secret.into()));
        self
    }

    /// Set scope.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.config.scope = scope.into();
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.config.resource = resource.into();
        self
    }

    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.config.state = state.into();
        self
    }

    /// Set resource-owner credentials for the password grant.
    pub fn resource_owner(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = username.into();
        self.config.password = Some(SecretString::new(password.into()));
        self
    }

    /// Send the client identity in the form instead of a Basic header.
    pub fn client_credentials_in_body(mut self, in_body: bool) -> Self {
        self.config.client_credentials_in_body = in_body;
        self
    }

    pub fn reject_unauthorized(mut self, reject: bool) -> Self {
        self.config.reject_unauthorized = reject;
        self
    }

    /// Add a typed custom header.
    pub fn header(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        kind: HeaderValueType,
    ) -> Self {
        self.config.headers.push(HeaderSpec::new(key, value, kind));
        self
    }

    /// Set proxy configuration.
    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        self
    }

    pub fn tls(mut self, tls: TlsMaterial) -> Self {
        self.config.tls = Some(tls);
        self
    }

    /// Set failure routing.
    pub fn error_handling(mut self, policy: ErrorHandling) -> Self {
        self.config.error_handling = policy;
        self
    }

    /// Set the message field receiving the token response.
    pub fn container(mut self, container: impl Into<String>) -> Self {
        self.config.container = container.into();
        self
    }

    /// Route failures to their own message field instead of the container.
    pub fn error_container(mut self, container: impl Into<String>) -> Self {
        self.config.error_container = Some(container.into());
        self
    }

    pub fn include_response_headers(mut self, include: bool) -> Self {
        self.config.include_response_headers = include;
        self
    }

    /// Set request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set how long a status stays visible before reset.
    pub fn status_reset_after(mut self, delay: Duration) -> Self {
        self.config.status_reset_after = delay;
        self
    }

    /// Build the node configuration.
    pub fn build(self) -> Result<NodeConfig, ConfigError> {
        let config = self.config;

        // The endpoint of a set_by_credentials node arrives with each message.
        if config.grant_type != GrantType::SetByCredentials {
            if config.access_token_url.is_empty() {
                return Err(ConfigError::MissingRequired {
                    field: "access_token_url".to_string(),
                });
            }
            url::Url::parse(&config.access_token_url).map_err(|_| ConfigError::InvalidEndpoint {
                url: config.access_token_url.clone(),
            })?;
        }

        if config.container.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "container".to_string(),
            });
        }

        Ok(config)
    }
}

/// Create a new node configuration builder.
pub fn node_config() -> NodeConfigBuilder {
    NodeConfigBuilder::new()
}
