//! State Parameter
//!
//! Anti-forgery token generation and the `<node id>:<csrf>` state format.

use base64::{engine::general_purpose::STANDARD, Engine};
use constant_time_eq::constant_time_eq;
use rand::Rng;

use crate::error::StateError;

/// Random bytes per CSRF token.
const CSRF_TOKEN_BYTES: usize = 18;

/// Generate a CSRF token: 18 random bytes, base64 with `/` as `-` and `+` as `_`.
pub fn generate_csrf_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; CSRF_TOKEN_BYTES] = rng.gen();
    STANDARD.encode(bytes).replace('/', "-").replace('+', "_")
}

/// Parsed `state` parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateParam {
    pub node_id: String,
    pub csrf_token: String,
}

impl StateParam {
    pub fn new(node_id: impl Into<String>, csrf_token: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            csrf_token: csrf_token.into(),
        }
    }

    /// Parse `<node id>:<csrf>`.
    ///
    /// Only the second `:`-separated component is the token; trailing
    /// components are ignored.
    pub fn parse(state: &str) -> Result<Self, StateError> {
        let mut parts = state.split(':');
        match (parts.next(), parts.next()) {
            (Some(node_id), Some(csrf)) if !node_id.is_empty() => Ok(Self::new(node_id, csrf)),
            _ => Err(StateError::MalformedState {
                state: state.to_string(),
            }),
        }
    }

    /// Node id of a state, tolerating a missing token part.
    pub fn node_id_of(state: &str) -> Option<&str> {
        state.split(':').next().filter(|id| !id.is_empty())
    }

    /// Check the token against the one stored for the node.
    pub fn verify(&self, expected: Option<&str>) -> Result<(), StateError> {
        match expected {
            Some(expected) if constant_time_eq(expected.as_bytes(), self.csrf_token.as_bytes()) => {
                Ok(())
            }
            _ => Err(StateError::TokenMismatch),
        }
    }
}

impl std::fmt::Display for StateParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.node_id, self.csrf_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csrf_token_shape() {
        let token = generate_csrf_token();
        assert_eq!(token.len(), 24);
        assert!(!token.contains('/'));
        assert!(!token.contains('+'));
        assert_ne!(token, generate_csrf_token());
    }

    #[test]
    fn test_state_round_trip() {
        let state = StateParam::new("n1", "abc");
        assert_eq!(state.to_string(), "n1:abc");
        assert_eq!(StateParam::parse("n1:abc").unwrap(), state);
    }

    #[test]
    fn test_state_rejects_malformed() {
        assert!(matches!(
            StateParam::parse("no-separator"),
            Err(StateError::MalformedState { .. })
        ));
        assert!(StateParam::parse(":abc").is_err());

        let state = StateParam::parse("n1:abc:extra").unwrap();
        assert_eq!(state.csrf_token, "abc");
        assert!(state.verify(Some("abc")).is_ok());
        assert_eq!(StateParam::node_id_of("n1"), Some("n1"));
    }

    #[test]
    fn test_verify() {
        let state = StateParam::new("n1", "abc");
        assert!(state.verify(Some("abc")).is_ok());
        assert_eq!(state.verify(Some("abd")), Err(StateError::TokenMismatch));
        assert_eq!(state.verify(None), Err(StateError::TokenMismatch));
    }
}
