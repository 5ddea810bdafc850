//! OAuth2 Types
//!
//! Core type definitions for token acquisition.

pub mod callback;
pub mod config;
pub mod credentials;
pub mod overrides;
pub mod proxy;
pub mod request;
pub mod token;

pub use callback::*;
pub use config::*;
pub use credentials::Credentials;
pub use overrides::*;
pub use proxy::{EnvironmentSnapshot, ProxyConfig, ProxyCredentials};
pub use request::*;
pub use token::*;
