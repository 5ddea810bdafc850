//! Proxy Types
//!
//! Proxy configuration objects and the environment snapshot the proxy
//! resolver reads instead of the live process environment.

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Proxy configuration node referenced by an OAuth2 node.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProxyConfig {
    /// Proxy URL, `scheme://host:port`.
    #[serde(default)]
    pub url: String,
    /// Hostname suffixes that bypass the proxy.
    #[serde(default, alias = "noproxy", deserialize_with = "de_no_proxy")]
    pub no_proxy: Vec<String>,
    /// Basic credentials for the proxy itself.
    #[serde(default)]
    pub credentials: Option<ProxyCredentials>,
}

impl ProxyConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_no_proxy(mut self, entries: Vec<String>) -> Self {
        self.no_proxy = entries;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(ProxyCredentials {
            username: username.into(),
            password: Some(SecretString::new(password.into())),
        });
        self
    }
}

/// Proxy basic-auth credentials.
#[derive(Clone, Deserialize)]
pub struct ProxyCredentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Option<SecretString>,
}

impl std::fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

// The host stores the list either as an array or as a comma-separated string.
fn de_no_proxy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        List(Vec<String>),
        Csv(String),
    }

    Ok(match Option::<Repr>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Repr::List(list)) => list,
        Some(Repr::Csv(csv)) => split_list(&csv),
    })
}

pub(crate) fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Environment variables captured once by the host and passed in explicitly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvironmentSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvironmentSnapshot {
    /// Empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the proxy-related variables of the current process.
    pub fn capture() -> Self {
        let vars = ["http_proxy", "HTTP_PROXY", "no_proxy", "NO_PROXY"]
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
            .collect();
        Self { vars }
    }

    /// Set a variable.
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Look up a variable.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// `http_proxy`, then `HTTP_PROXY`, ignoring empty values.
    pub fn http_proxy(&self) -> Option<&str> {
        self.first_non_empty(&["http_proxy", "HTTP_PROXY"])
    }

    /// `no_proxy`/`NO_PROXY` split on commas.
    pub fn no_proxy(&self) -> Vec<String> {
        self.first_non_empty(&["no_proxy", "NO_PROXY"])
            .map(split_list)
            .unwrap_or_default()
    }

    fn first_non_empty(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|name| self.get(name))
            .find(|value| !value.is_empty())
    }
}
