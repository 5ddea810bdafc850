//! Request Options Builder
//!
//! Maps static configuration, an optional per-call override and the stored
//! credentials to a [`RequestDescriptor`]. Pure: no I/O, no clock, no
//! environment. Identical inputs give identical descriptors.

use base64::{engine::general_purpose::STANDARD, Engine};
use secrecy::ExposeSecret;
use std::collections::BTreeMap;

use crate::core::HttpMethod;
use crate::error::ConfigError;
use crate::types::credentials::non_empty;
use crate::types::{
    Credentials, GrantType, HeaderValue, NodeConfig, OverrideGrant, RequestDescriptor,
    RequestHeaders, RequestOverride, TlsPolicy, OVERRIDE_FIELD,
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Build the token request for one exchange.
pub fn build_options(
    config: &NodeConfig,
    request: Option<&RequestOverride>,
    credentials: Option<&Credentials>,
) -> Result<RequestDescriptor, ConfigError> {
    let grant = match request {
        Some(request) => request.credentials.grant.clone(),
        None => config_grant(config)?,
    };
    build_options_for_grant(config, grant, request, credentials)
}

/// Build the token request for an explicit grant, ignoring the override's own.
///
/// Used by the lifecycle node, which decides the grant from its state.
pub fn build_options_for_grant(
    config: &NodeConfig,
    grant: OverrideGrant,
    request: Option<&RequestOverride>,
    credentials: Option<&Credentials>,
) -> Result<RequestDescriptor, ConfigError> {
    let fields = Fields::new(config, request, credentials);
    let grant_type = grant.grant_type();

    let url = fields.pick(
        request.and_then(|r| r.access_token_url.as_deref()),
        &config.access_token_url,
    );
    let url = url.ok_or_else(|| ConfigError::MissingRequired {
        field: "access_token_url".to_string(),
    })?;
    url::Url::parse(url).map_err(|_| ConfigError::InvalidEndpoint {
        url: url.to_string(),
    })?;

    let mut form: BTreeMap<String, Option<String>> = BTreeMap::new();
    form.insert("grant_type".into(), Some(grant_type.wire_value().into()));

    match &grant {
        OverrideGrant::ClientCredentials => fields.scope_fields(&mut form),
        OverrideGrant::Password { username, password } => {
            fields.scope_fields(&mut form);
            let config_password = config.password.as_ref().map(|p| p.expose_secret().as_str());
            form.insert(
                "username".into(),
                fields.pick(username.as_deref(), &config.username).map(String::from),
            );
            form.insert(
                "password".into(),
                fields
                    .pick(password.as_deref(), config_password.unwrap_or_default())
                    .map(String::from),
            );
        }
        OverrideGrant::AuthorizationCode | OverrideGrant::Implicit => {
            let stored = credentials.cloned().unwrap_or_default();
            form.insert("code".into(), stored.code);
            form.insert("redirect_uri".into(), stored.redirect_uri);
        }
        OverrideGrant::RefreshToken { refresh_token } => {
            let token = refresh_token
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(String::from)
                .or_else(|| credentials.and_then(|c| c.refresh_token.clone()));
            form.insert("refresh_token".into(), token);
        }
    }

    let (client_id, client_secret) = fields.client_identity();
    let mut headers = RequestHeaders::new();
    headers.insert("Content-Type", FORM_CONTENT_TYPE);
    headers.insert("Accept", "application/json");

    if client_id.is_some() || client_secret.is_some() {
        if config.client_credentials_in_body {
            form.insert("client_id".into(), client_id.map(String::from));
            form.insert("client_secret".into(), client_secret.map(String::from));
        } else {
            let pair = format!(
                "{}:{}",
                client_id.unwrap_or_default(),
                client_secret.unwrap_or_default()
            );
            headers.insert("Authorization", format!("Basic {}", STANDARD.encode(pair)));
        }
    }

    for spec in config.headers.iter().filter(|h| !h.key.is_empty()) {
        let value = HeaderValue::coerce(spec)?;
        headers.insert_if_absent(&spec.key, value);
    }
    if let Some(request) = request {
        for (key, value) in request.headers.iter().filter(|(k, _)| !k.is_empty()) {
            headers.insert_if_absent(key, value.as_str());
        }
    }

    let reject_unauthorized = request
        .and_then(|r| r.reject_unauthorized)
        .unwrap_or(config.reject_unauthorized);

    Ok(RequestDescriptor {
        method: HttpMethod::Post,
        url: url.to_string(),
        grant_type,
        headers,
        form: prune(form),
        proxy: None,
        tls: TlsPolicy {
            reject_unauthorized,
            material: config.tls.clone(),
        },
        timeout: config.timeout,
    })
}

/// Grant described by the static configuration alone.
fn config_grant(config: &NodeConfig) -> Result<OverrideGrant, ConfigError> {
    Ok(match config.grant_type {
        GrantType::ClientCredentials => OverrideGrant::ClientCredentials,
        GrantType::Password => OverrideGrant::Password {
            username: None,
            password: None,
        },
        GrantType::AuthorizationCode => OverrideGrant::AuthorizationCode,
        GrantType::Implicit => OverrideGrant::Implicit,
        GrantType::RefreshToken => OverrideGrant::RefreshToken {
            refresh_token: None,
        },
        GrantType::SetByCredentials => {
            return Err(ConfigError::MissingRequired {
                field: OVERRIDE_FIELD.to_string(),
            })
        }
    })
}

/// Drop absent and empty-string values.
fn prune(form: BTreeMap<String, Option<String>>) -> BTreeMap<String, String> {
    form.into_iter()
        .filter_map(|(key, value)| value.filter(|v| !v.is_empty()).map(|v| (key, v)))
        .collect()
}

/// Field resolution across override, configuration and stored credentials.
struct Fields<'a> {
    config: &'a NodeConfig,
    request: Option<&'a RequestOverride>,
    credentials: Option<&'a Credentials>,
    /// A set_by_credentials node takes nothing from its own configuration.
    override_only: bool,
}

impl<'a> Fields<'a> {
    fn new(
        config: &'a NodeConfig,
        request: Option<&'a RequestOverride>,
        credentials: Option<&'a Credentials>,
    ) -> Self {
        Self {
            config,
            request,
            credentials,
            override_only: config.grant_type == GrantType::SetByCredentials,
        }
    }

    fn pick(&self, from_override: Option<&'a str>, from_config: &'a str) -> Option<&'a str> {
        let from_override = from_override.filter(|s| !s.is_empty());
        if self.override_only {
            return from_override;
        }
        from_override.or_else(|| Some(from_config).filter(|s| !s.is_empty()))
    }

    fn scope_fields(&self, form: &mut BTreeMap<String, Option<String>>) {
        let creds = self.request.map(|r| &r.credentials);
        let entries = [
            ("scope", creds.and_then(|c| c.scope.as_deref()), &self.config.scope),
            ("resource", creds.and_then(|c| c.resource.as_deref()), &self.config.resource),
            ("state", creds.and_then(|c| c.state.as_deref()), &self.config.state),
        ];
        for (key, from_override, from_config) in entries {
            form.insert(key.into(), self.pick(from_override, from_config).map(String::from));
        }
    }

    fn client_identity(&self) -> (Option<&'a str>, Option<&'a str>) {
        let creds = self.request.map(|r| &r.credentials);
        let config_secret = self
            .config
            .client_secret
            .as_ref()
            .map(|s| s.expose_secret().as_str())
            .unwrap_or_default();

        let mut id = self.pick(creds.and_then(|c| c.client_id.as_deref()), &self.config.client_id);
        let mut secret = self.pick(creds.and_then(|c| c.client_secret.as_deref()), config_secret);

        if !self.override_only {
            if let Some(stored) = self.credentials {
                id = id.or_else(|| non_empty(&stored.client_id));
                secret = secret.or_else(|| non_empty(&stored.client_secret));
            }
        }
        (id, secret)
    }
}
