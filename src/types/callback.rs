//! Callback Types
//!
//! Query parameters of the admin authorization surface.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::credentials::non_empty;

/// Query of the authorization-start request.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequestQuery {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Node id the consent is performed for.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub callback: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    /// Everything else the editor sent along.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthRequestQuery {
    /// First required parameter that is absent or empty.
    pub fn missing_parameter(&self) -> Option<&'static str> {
        [
            ("clientId", &self.client_id),
            ("clientSecret", &self.client_secret),
            ("id", &self.id),
            ("callback", &self.callback),
        ]
        .into_iter()
        .find(|(_, value)| non_empty(value).is_none())
        .map(|(name, _)| name)
    }
}

impl std::fmt::Debug for AuthRequestQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRequestQuery")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("id", &self.id)
            .field("callback", &self.callback)
            .field("redirect_uri", &self.redirect_uri)
            .field("scope", &self.scope)
            .field("authorization_endpoint", &self.authorization_endpoint)
            .finish()
    }
}

/// Consent callback parameters.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl CallbackQuery {
    /// Parse callback parameters from a full redirect URL.
    pub fn from_url(url: &url::Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                "error_description" => params.error_description = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }

    /// Check if callback contains an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Where the admin surface sends the user agent next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthRedirect {
    /// Provider authorization URL.
    pub url: url::Url,
    /// Anti-forgery token, also set as the `csrf` cookie.
    pub csrf_token: String,
    /// Full `state` parameter, `<node id>:<csrf>`.
    pub state: String,
}

/// Answer of the credentials lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeGrant {
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_parameter_order() {
        let query: AuthRequestQuery = serde_json::from_value(json!({
            "clientId": "foo",
            "clientSecret": "",
            "id": "n1"
        }))
        .unwrap();
        assert_eq!(query.missing_parameter(), Some("clientSecret"));
    }

    #[test]
    fn test_callback_from_url() {
        let url = url::Url::parse(
            "https://host/oauth2/auth/callback?error=access_denied&error_description=nope&state=n1%3Aabc",
        )
        .unwrap();
        let params = CallbackQuery::from_url(&url);
        assert!(params.is_error());
        assert_eq!(params.state.as_deref(), Some("n1:abc"));
    }
}
