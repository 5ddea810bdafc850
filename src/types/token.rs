//! Token Types
//!
//! Provider responses and the token views derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::types::{Credentials, DEFAULT_EXPIRES_IN};

/// A 2xx answer from the token endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON, or the raw text as a string when the body is not JSON.
    pub body: Value,
}

impl ProviderResponse {
    /// Create new response.
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            status_text: String::new(),
            headers: BTreeMap::new(),
            body,
        }
    }

    /// Interpret the body as a token response.
    pub fn token(&self) -> Option<TokenResponse> {
        serde_json::from_value(self.body.clone()).ok()
    }
}

/// Token response from authorization server.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds. Some providers send it as a string.
    #[serde(default, deserialize_with = "de_lenient_u64")]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl TokenResponse {
    /// Lifetime, falling back to [`DEFAULT_EXPIRES_IN`] and capped at [`MAX_EXPIRES_IN`].
    pub fn lifetime_secs(&self) -> u64 {
        self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN).min(MAX_EXPIRES_IN)
    }
}

/// Longest lifetime honoured from a provider, in seconds (100 years).
pub const MAX_EXPIRES_IN: u64 = 100 * 365 * 24 * 60 * 60;

/// Unix expiry time for a lifetime starting at `now`.
pub fn expire_time_from(now: i64, lifetime_secs: u64) -> i64 {
    let lifetime = i64::try_from(lifetime_secs.min(MAX_EXPIRES_IN)).unwrap_or(i64::MAX);
    now.saturating_add(lifetime)
}

fn de_lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Token currently held for a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// View the token part of a credential record.
    pub fn from_credentials(credentials: &Credentials) -> Option<Self> {
        let access_token = credentials
            .access_token
            .as_ref()
            .filter(|t| !t.is_empty())?
            .clone();
        Some(Self {
            access_token,
            refresh_token: credentials.refresh_token.clone(),
            expires_at: credentials.expires_at(),
        })
    }

    /// Check if token is expired.
    pub fn expired(&self) -> bool {
        self.expired_at(Utc::now())
    }

    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }

    /// Get remaining lifetime in seconds.
    pub fn remaining_lifetime(&self) -> Option<i64> {
        self.expires_at
            .map(|exp| (exp - Utc::now()).num_seconds().max(0))
    }
}

/// Value emitted under `payload` by the lifecycle node.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSummary {
    pub access_token: String,
    pub expires_in: Option<u64>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_token: Option<String>,
}

impl TokenSummary {
    /// Summarize a provider answer, keeping `refresh_token` from `previous`
    /// when the provider omits it.
    pub fn from_response(response: &TokenResponse, previous: Option<&StoredToken>) -> Self {
        Self {
            access_token: response.access_token.clone().unwrap_or_default(),
            expires_in: response.expires_in,
            token_type: response.token_type.clone(),
            scope: response.scope.clone(),
            refresh_token: response
                .refresh_token
                .clone()
                .or_else(|| previous.and_then(|t| t.refresh_token.clone())),
            jwt_token: None,
        }
    }
}
