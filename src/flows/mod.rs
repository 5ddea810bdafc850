//! OAuth2 Flows
//!
//! Interactive flows driven from outside the message path.
//!
//! - **Authorization Code Consent** (RFC 6749 Section 4.1): admin surface
//!   starting a browser consent and capturing the returned code

pub mod authorization;

pub use authorization::{create_authorization_admin, AuthorizationAdmin, AuthorizationAdminImpl};
