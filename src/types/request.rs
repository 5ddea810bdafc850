//! Request Types
//!
//! The canonical token request descriptor produced by the options builder.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::core::{HttpMethod, ResolvedProxy};
use crate::error::ConfigError;
use crate::types::{GrantType, HeaderSpec, HeaderValueType, TlsMaterial};

/// Form keys never printed by `Debug`.
const SENSITIVE_FORM_KEYS: &[&str] = &["client_secret", "password", "refresh_token", "code"];

/// A header value coerced to its declared type.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Str(String),
    Num(i64),
    Bool(bool),
    Json(Value),
}

impl HeaderValue {
    /// Coerce a configured header per its declared type.
    pub fn coerce(spec: &HeaderSpec) -> Result<Self, ConfigError> {
        match spec.kind {
            HeaderValueType::Str => Ok(Self::Str(spec.value.clone())),
            HeaderValueType::Bool => Ok(Self::Bool(spec.value.trim() == "true")),
            HeaderValueType::Num => spec
                .value
                .trim()
                .parse::<i64>()
                .map(Self::Num)
                .map_err(|e| ConfigError::InvalidHeader {
                    key: spec.key.clone(),
                    kind: spec.kind.as_str(),
                    message: e.to_string(),
                }),
            HeaderValueType::Json => serde_json::from_str(&spec.value)
                .map(Self::Json)
                .map_err(|e| ConfigError::InvalidHeader {
                    key: spec.key.clone(),
                    kind: spec.kind.as_str(),
                    message: e.to_string(),
                }),
        }
    }

    /// Value as sent on the wire.
    pub fn to_wire(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Num(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Json(Value::String(s)) => s.clone(),
            Self::Json(v) => v.to_string(),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Header set with case-insensitive names.
///
/// Names keep the spelling they were first inserted with.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestHeaders {
    entries: BTreeMap<String, (String, HeaderValue)>,
}

impl RequestHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a header.
    pub fn insert(&mut self, name: &str, value: impl Into<HeaderValue>) {
        self.entries
            .insert(name.to_ascii_lowercase(), (name.to_string(), value.into()));
    }

    /// Insert only when no header of that name exists. Returns whether it was inserted.
    pub fn insert_if_absent(&mut self, name: &str, value: impl Into<HeaderValue>) -> bool {
        if self.contains(name) {
            return false;
        }
        self.insert(name, value);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value)
    }

    pub fn remove(&mut self, name: &str) -> Option<HeaderValue> {
        self.entries
            .remove(&name.to_ascii_lowercase())
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate as `(name, value)` in case-insensitive name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries
            .values()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Wire representation, one string per header.
    pub fn to_wire(&self) -> BTreeMap<String, String> {
        self.iter()
            .map(|(name, value)| (name.to_string(), value.to_wire()))
            .collect()
    }
}

/// TLS verification and trust material for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsPolicy {
    /// Verify the server certificate. Only `false` when explicitly configured.
    pub reject_unauthorized: bool,
    pub material: Option<TlsMaterial>,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self {
            reject_unauthorized: true,
            material: None,
        }
    }
}

impl TlsPolicy {
    /// Whether the default client can serve this policy.
    pub fn is_default(&self) -> bool {
        self.reject_unauthorized && self.material.is_none()
    }
}

/// Fully-assembled token request.
#[derive(Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub url: String,
    /// Grant type the request was assembled for.
    pub grant_type: GrantType,
    pub headers: RequestHeaders,
    /// Form parameters, already pruned of empty values.
    pub form: BTreeMap<String, String>,
    pub proxy: Option<ResolvedProxy>,
    pub tls: TlsPolicy,
    pub timeout: Duration,
}

impl RequestDescriptor {
    /// Whether the client authenticates with an HTTP Basic header.
    pub fn uses_basic_auth(&self) -> bool {
        matches!(
            self.headers.get("authorization"),
            Some(HeaderValue::Str(v)) if v.starts_with("Basic ")
        )
    }

    /// Whether the client authenticates with form parameters.
    pub fn uses_body_auth(&self) -> bool {
        self.form.contains_key("client_id") || self.form.contains_key("client_secret")
    }

    /// `application/x-www-form-urlencoded` body.
    pub fn encoded_form(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.form.iter())
            .finish()
    }
}

impl std::fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let form: BTreeMap<&str, &str> = self
            .form
            .iter()
            .map(|(k, v)| {
                if SENSITIVE_FORM_KEYS.contains(&k.as_str()) {
                    (k.as_str(), "[REDACTED]")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();
        let headers: Vec<&str> = self.headers.iter().map(|(name, _)| name).collect();

        f.debug_struct("RequestDescriptor")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("grant_type", &self.grant_type)
            .field("headers", &headers)
            .field("form", &form)
            .field("proxy", &self.proxy)
            .field("tls", &self.tls)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_header_coercion() {
        let num = HeaderSpec::new("X-Num", " 42 ", HeaderValueType::Num);
        assert_eq!(HeaderValue::coerce(&num).unwrap(), HeaderValue::Num(42));

        let flag = HeaderSpec::new("X-Flag", "false", HeaderValueType::Bool);
        assert_eq!(HeaderValue::coerce(&flag).unwrap(), HeaderValue::Bool(false));

        let json = HeaderSpec::new("X-Json", r#"{"a":[1,2]}"#, HeaderValueType::Json);
        let value = HeaderValue::coerce(&json).unwrap();
        assert_eq!(value, HeaderValue::Json(json!({"a": [1, 2]})));
        assert_eq!(value.to_wire(), r#"{"a":[1,2]}"#);
    }

    #[test]
    fn test_malformed_json_header_is_config_error() {
        let spec = HeaderSpec::new("X-Json", "{not json", HeaderValueType::Json);
        let err = HeaderValue::coerce(&spec).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHeader { kind: "json", .. }));
    }

    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = RequestHeaders::new();
        headers.insert("Authorization", "Basic abc");
        assert!(headers.contains("authorization"));
        assert!(!headers.insert_if_absent("AUTHORIZATION", "Bearer xyz"));
        assert_eq!(headers.get("authorization"), Some(&HeaderValue::from("Basic abc")));
        assert_eq!(headers.to_wire().get("Authorization").map(String::as_str), Some("Basic abc"));
    }
}
