//! Credential Types
//!
//! The per-node credential record persisted by the host.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Credential record keyed by node id.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Single-use authorization code delivered by the consent redirect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "redirect_uri")]
    pub redirect_uri: Option<String>,
    /// Anti-forgery token of the pending authorization request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry of `access_token` in epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_time: Option<i64>,
    /// Last raw provider payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth2_response: Option<Value>,
    /// Remaining fields captured from the authorization request.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Credentials {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expiry as a timestamp.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expire_time
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    /// Whether a client identity has been captured.
    pub fn has_client(&self) -> bool {
        non_empty(&self.client_id).is_some() && non_empty(&self.client_secret).is_some()
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("code", &redact(&self.code))
            .field("redirect_uri", &self.redirect_uri)
            .field("csrf_token", &redact(&self.csrf_token))
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("expire_time", &self.expire_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_host_shape_round_trip() {
        let creds: Credentials = serde_json::from_value(json!({
            "clientId": "foo",
            "clientSecret": "bar",
            "redirect_uri": "https://app/cb",
            "csrfToken": "abc",
            "callback": "https://host/oauth2/auth/callback"
        }))
        .unwrap();

        assert_eq!(creds.redirect_uri.as_deref(), Some("https://app/cb"));
        assert!(creds.has_client());
        assert_eq!(
            creds.extra.get("callback"),
            Some(&json!("https://host/oauth2/auth/callback"))
        );

        let value = serde_json::to_value(&creds).unwrap();
        assert_eq!(value["redirectUri"], json!("https://app/cb"));
        assert!(value.get("accessToken").is_none());
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let mut creds = Credentials::new();
        assert!(creds.expires_at().is_none());

        creds.expire_time = Some((now - Duration::hours(1)).timestamp());
        assert_eq!(creds.expires_at().unwrap().timestamp(), creds.expire_time.unwrap());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let creds = Credentials {
            access_token: Some("secret-token".to_string()),
            ..Default::default()
        };
        assert!(!format!("{:?}", creds).contains("secret-token"));
    }
}
