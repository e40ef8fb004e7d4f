//! Configuration management for agents.
//!
//! [`AgentConfig`] is resolved once at startup and handed to the pieces
//! that need it. Sources are layered: built-in defaults, then an optional
//! TOML file, then environment variables. Command-line overrides are
//! applied by the binary on top of the result.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use schema::{
    AgentConfig, AgentProfile, AuthConfig, DEFAULT_AGENT_NAME, DEFAULT_INSTRUCTION,
    DEFAULT_LOCATION, DEFAULT_MODEL, DEFAULT_TOOL_NAME, ProjectConfig, RemoteConfig, env,
};

pub use agent_telemetry::{LogFormat, TelemetryConfig};
