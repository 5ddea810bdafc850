//! Token summary JWTs.

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Issuer of minted summary tokens.
pub const JWT_ISSUER: &str = "node-red-contrib-oauth2";

/// Lifetime of minted summary tokens, in seconds.
pub const JWT_LIFETIME_SECS: i64 = 3600;

/// Claims of a summary token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Sign an HS256 token wrapping `access_token`, keyed by the client secret.
pub fn mint_jwt(
    access_token: &str,
    scope: Option<&str>,
    client_id: &str,
    client_secret: &str,
) -> Result<String, ProtocolError> {
    let now = Utc::now().timestamp();
    let claims = SummaryClaims {
        sub: access_token.to_string(),
        scope: scope.map(String::from),
        iss: JWT_ISSUER.to_string(),
        aud: client_id.to_string(),
        iat: now,
        exp: now + JWT_LIFETIME_SECS,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(client_secret.as_bytes()),
    )
    .map_err(|e| ProtocolError::InvalidResponse {
        message: format!("failed to sign token summary: {}", e),
    })
}
