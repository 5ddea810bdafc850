//! Per-Call Overrides
//!
//! The `oauth2Request` object an inbound message may carry to replace parts
//! of the node configuration for one exchange.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::ConfigError;
use crate::types::GrantType;

/// Message field holding the override.
pub const OVERRIDE_FIELD: &str = "oauth2Request";

/// Grant-specific part of an override.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OverrideGrant {
    ClientCredentials,
    Password {
        username: Option<String>,
        password: Option<String>,
    },
    /// Code and redirect URI always come from stored credentials.
    AuthorizationCode,
    Implicit,
    RefreshToken {
        refresh_token: Option<String>,
    },
}

impl OverrideGrant {
    pub fn grant_type(&self) -> GrantType {
        match self {
            Self::ClientCredentials => GrantType::ClientCredentials,
            Self::Password { .. } => GrantType::Password,
            Self::AuthorizationCode => GrantType::AuthorizationCode,
            Self::Implicit => GrantType::Implicit,
            Self::RefreshToken { .. } => GrantType::RefreshToken,
        }
    }
}

/// Client identity and grant of an override.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverrideCredentials {
    pub grant: OverrideGrant,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
    pub resource: Option<String>,
    pub state: Option<String>,
}

/// A validated per-call override.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestOverride {
    pub access_token_url: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub reject_unauthorized: Option<bool>,
    pub credentials: OverrideCredentials,
}

#[derive(Deserialize)]
struct RawOverride {
    #[serde(default, alias = "accessTokenUrl")]
    access_token_url: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, Value>,
    #[serde(default, alias = "rejectUnauthorized")]
    reject_unauthorized: Option<bool>,
    #[serde(default)]
    credentials: RawCredentials,
}

#[derive(Default, Deserialize)]
struct RawCredentials {
    #[serde(default, alias = "grantType")]
    grant_type: Option<String>,
    #[serde(default, alias = "clientId")]
    client_id: Option<String>,
    #[serde(default, alias = "clientSecret")]
    client_secret: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    resource: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default, alias = "userName")]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default, alias = "refreshToken")]
    refresh_token: Option<String>,
}

impl RequestOverride {
    /// Validate a raw override.
    ///
    /// `fallback` is the node's grant type, used when the override names none.
    pub fn parse(value: Value, fallback: GrantType) -> Result<Self, ConfigError> {
        let raw: RawOverride =
            serde_json::from_value(value).map_err(|e| ConfigError::InvalidOverride {
                message: e.to_string(),
            })?;

        let named = raw
            .credentials
            .grant_type
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::parse::<GrantType>)
            .transpose()?;

        let RawCredentials {
            client_id,
            client_secret,
            scope,
            resource,
            state,
            username,
            password,
            refresh_token,
            ..
        } = raw.credentials;

        let grant = match named.unwrap_or(fallback) {
            GrantType::ClientCredentials => OverrideGrant::ClientCredentials,
            GrantType::Password => OverrideGrant::Password { username, password },
            GrantType::AuthorizationCode => OverrideGrant::AuthorizationCode,
            GrantType::Implicit => OverrideGrant::Implicit,
            GrantType::RefreshToken => OverrideGrant::RefreshToken { refresh_token },
            GrantType::SetByCredentials => {
                return Err(ConfigError::MissingRequired {
                    field: format!("{}.credentials.grant_type", OVERRIDE_FIELD),
                })
            }
        };

        let headers = raw
            .headers
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect();

        Ok(Self {
            access_token_url: raw.access_token_url.filter(|s| !s.is_empty()),
            headers,
            reject_unauthorized: raw.reject_unauthorized,
            credentials: OverrideCredentials {
                grant,
                client_id,
                client_secret,
                scope,
                resource,
                state,
            },
        })
    }

    pub fn grant_type(&self) -> GrantType {
        self.credentials.grant.grant_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_password_override() {
        let value = json!({
            "access_token_url": "https://example.com/token",
            "headers": {"X-Trace": 7},
            "credentials": {
                "grant_type": "password",
                "client_id": "foo",
                "username": "alice",
                "password": "secret"
            }
        });
        let parsed = RequestOverride::parse(value, GrantType::ClientCredentials).unwrap();

        assert_eq!(parsed.grant_type(), GrantType::Password);
        assert_eq!(
            parsed.credentials.grant,
            OverrideGrant::Password {
                username: Some("alice".to_string()),
                password: Some("secret".to_string())
            }
        );
        assert_eq!(parsed.headers.get("X-Trace").map(String::as_str), Some("7"));
    }

    #[test]
    fn test_parse_falls_back_to_node_grant() {
        let value = json!({"credentials": {"refresh_token": "r1"}});
        let parsed = RequestOverride::parse(value, GrantType::RefreshToken).unwrap();
        assert_eq!(
            parsed.credentials.grant,
            OverrideGrant::RefreshToken {
                refresh_token: Some("r1".to_string())
            }
        );
    }

    #[test]
    fn test_parse_rejects_unresolvable_grant() {
        let err = RequestOverride::parse(json!({}), GrantType::SetByCredentials).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));

        let err = RequestOverride::parse(
            json!({"credentials": {"grant_type": "device_code"}}),
            GrantType::ClientCredentials,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedGrantType { .. }));

        let err = RequestOverride::parse(json!("nope"), GrantType::ClientCredentials).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));
    }
}
