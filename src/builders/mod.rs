//! Builders
//!
//! Fluent configuration builder and the token request options builder.

pub mod config;
pub mod options;

pub use config::{node_config, NodeConfigBuilder};
pub use options::{build_options, build_options_for_grant};
