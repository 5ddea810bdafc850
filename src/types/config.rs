//! Configuration Types
//!
//! Static node configuration as handed over by the host when a node is
//! instantiated. Every field has a default so that node definitions saved by
//! older host versions still load.

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::ProxyConfig;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Lifetime assumed when the provider omits `expires_in`.
pub const DEFAULT_EXPIRES_IN: u64 = 3600;
/// Delay after which the node status indicator returns to idle.
pub const DEFAULT_STATUS_RESET: Duration = Duration::from_secs(5);
/// Message field receiving a successful token response.
pub const DEFAULT_CONTAINER: &str = "oauth2Response";

/// Grant type selected by the node or the per-call request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GrantType {
    #[default]
    ClientCredentials,
    Password,
    AuthorizationCode,
    RefreshToken,
    /// Legacy label; exchanged as `authorization_code`.
    Implicit,
    /// The whole request comes from the per-call override.
    SetByCredentials,
}

impl GrantType {
    /// Label as configured on the node.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientCredentials => "client_credentials",
            Self::Password => "password",
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::Implicit => "implicit",
            Self::SetByCredentials => "set_by_credentials",
        }
    }

    /// Value sent as the `grant_type` form parameter.
    pub fn wire_value(&self) -> &'static str {
        match self {
            Self::Implicit => "authorization_code",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "client_credentials" | "clientCredentials" => Ok(Self::ClientCredentials),
            "password" => Ok(Self::Password),
            "authorization_code" | "authorizationCode" => Ok(Self::AuthorizationCode),
            "refresh_token" | "refreshToken" => Ok(Self::RefreshToken),
            "implicit" | "implicit_flow" => Ok(Self::Implicit),
            "set_by_credentials" => Ok(Self::SetByCredentials),
            other => Err(ConfigError::UnsupportedGrantType {
                grant_type: other.to_string(),
            }),
        }
    }
}

impl<'de> Deserialize<'de> for GrantType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// What happens to a failed exchange.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorHandling {
    /// Attach the error and continue on the primary output.
    #[default]
    Inline,
    /// Send on the secondary output.
    OtherOutput,
    /// Escalate to the host error channel.
    AllInOne,
    /// Escalate to the host error channel.
    Throw,
}

impl ErrorHandling {
    /// Whether failures leave through the host's node error channel.
    pub fn escalates(&self) -> bool {
        matches!(self, Self::AllInOne | Self::Throw)
    }
}

impl FromStr for ErrorHandling {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "inline" | "standard" => Ok(Self::Inline),
            "other-output" | "other_output" => Ok(Self::OtherOutput),
            "all-in-one" | "all_in_one" => Ok(Self::AllInOne),
            "throw" => Ok(Self::Throw),
            other => Err(ConfigError::InvalidConfig {
                message: format!("unknown error handling mode '{}'", other),
            }),
        }
    }
}

impl<'de> Deserialize<'de> for ErrorHandling {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Declared type of a custom header value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderValueType {
    #[default]
    Str,
    Num,
    Bool,
    Json,
}

impl HeaderValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Num => "num",
            Self::Bool => "bool",
            Self::Json => "json",
        }
    }
}

/// A custom header configured on the node.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct HeaderSpec {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(rename = "type", default)]
    pub kind: HeaderValueType,
}

impl HeaderSpec {
    pub fn new(key: impl Into<String>, value: impl Into<String>, kind: HeaderValueType) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            kind,
        }
    }
}

/// PEM trust material for the token endpoint connection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TlsMaterial {
    #[serde(default, alias = "certdata")]
    pub cert_pem: Option<String>,
    #[serde(default, alias = "keydata")]
    pub key_pem: Option<String>,
    #[serde(default, alias = "cadata")]
    pub ca_pem: Option<String>,
}

/// Static node configuration.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "grant_type")]
    pub grant_type: GrantType,
    #[serde(default, alias = "access_token_url")]
    pub access_token_url: String,
    #[serde(default, alias = "client_id")]
    pub client_id: String,
    #[serde(default, alias = "client_secret", deserialize_with = "de_secret")]
    pub client_secret: Option<SecretString>,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, alias = "userName")]
    pub username: String,
    #[serde(default, deserialize_with = "de_secret")]
    pub password: Option<SecretString>,
    #[serde(default, alias = "client_credentials_in_body")]
    pub client_credentials_in_body: bool,
    #[serde(default = "default_true")]
    pub reject_unauthorized: bool,
    #[serde(default, deserialize_with = "de_headers")]
    pub headers: Vec<HeaderSpec>,
    #[serde(default, deserialize_with = "de_proxy")]
    pub proxy: Option<ProxyConfig>,
    #[serde(default)]
    pub tls: Option<TlsMaterial>,
    #[serde(default)]
    pub error_handling: ErrorHandling,
    #[serde(default = "default_container", deserialize_with = "de_container")]
    pub container: String,
    /// Separate field for failures. Unset means failures land in `container`.
    #[serde(default, deserialize_with = "de_error_container")]
    pub error_container: Option<String>,
    #[serde(default)]
    pub include_response_headers: bool,
    #[serde(default = "default_timeout", rename = "timeoutMs", deserialize_with = "de_millis")]
    pub timeout: Duration,
    #[serde(
        default = "default_status_reset",
        rename = "statusResetMs",
        deserialize_with = "de_millis"
    )]
    pub status_reset_after: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            grant_type: GrantType::default(),
            access_token_url: String::new(),
            client_id: String::new(),
            client_secret: None,
            scope: String::new(),
            resource: String::new(),
            state: String::new(),
            username: String::new(),
            password: None,
            client_credentials_in_body: false,
            reject_unauthorized: true,
            headers: Vec::new(),
            proxy: None,
            tls: None,
            error_handling: ErrorHandling::default(),
            container: default_container(),
            error_container: None,
            include_response_headers: false,
            timeout: DEFAULT_TIMEOUT,
            status_reset_after: DEFAULT_STATUS_RESET,
        }
    }
}

impl NodeConfig {
    /// Message field receiving a failed exchange.
    pub fn error_field(&self) -> &str {
        self.error_container.as_deref().unwrap_or(&self.container)
    }

    /// Parse a node definition as stored by the host.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidConfig {
            message: e.to_string(),
        })
    }

    /// Parse a node definition from an already-decoded value.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value).map_err(|e| ConfigError::InvalidConfig {
            message: e.to_string(),
        })
    }
}

impl fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeConfig")
            .field("id", &self.id)
            .field("grant_type", &self.grant_type)
            .field("access_token_url", &self.access_token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scope", &self.scope)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("client_credentials_in_body", &self.client_credentials_in_body)
            .field("reject_unauthorized", &self.reject_unauthorized)
            .field("headers", &self.headers)
            .field("proxy", &self.proxy)
            .field("error_handling", &self.error_handling)
            .field("container", &self.container)
            .field("error_container", &self.error_container)
            .finish()
    }
}

fn default_true() -> bool {
    true
}

fn default_container() -> String {
    DEFAULT_CONTAINER.to_string()
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_status_reset() -> Duration {
    DEFAULT_STATUS_RESET
}

fn de_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    Ok(Duration::from_millis(u64::deserialize(deserializer)?))
}

fn de_secret<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<SecretString>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(SecretString::new))
}

// Older node definitions saved an empty container name.
fn de_container<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).unwrap_or_else(default_container))
}

fn de_error_container<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()))
}

// Older node definitions saved `proxy: ""` when no proxy node was selected.
fn de_proxy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<ProxyConfig>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        other => serde_json::from_value(other)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Headers arrive either as a list of typed specs or as a legacy object map.
fn de_headers<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<HeaderSpec>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HeadersRepr {
        List(Vec<HeaderSpec>),
        Map(BTreeMap<String, Value>),
    }

    let repr = Option::<HeadersRepr>::deserialize(deserializer)?;
    let specs = match repr {
        None => Vec::new(),
        Some(HeadersRepr::List(list)) => list,
        Some(HeadersRepr::Map(map)) => map
            .into_iter()
            .map(|(name, value)| match value {
                Value::Object(_) => {
                    serde_json::from_value::<HeaderSpec>(value).map_err(serde::de::Error::custom)
                }
                Value::String(s) => Ok(HeaderSpec::new(name, s, HeaderValueType::Str)),
                other => Ok(HeaderSpec::new(name, other.to_string(), HeaderValueType::Str)),
            })
            .collect::<Result<Vec<_>, _>>()?,
    };
    Ok(specs)
}
