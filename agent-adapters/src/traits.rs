//! Shared transport traits and data structures.

use agent_primitives::{IdentityToken, ServiceEndpoint};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Result alias used by transport adapters.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Error type shared by adapter implementations.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Adapter is misconfigured (bad URL, unusable header value, ...).
    #[error("adapter not configured: {reason}")]
    Configuration {
        /// Additional context for the failure.
        reason: String,
    },

    /// The remote server refused the presented credentials.
    #[error("unauthorized: remote server answered {status}")]
    Unauthorized {
        /// HTTP status returned by the server (401 or 403).
        status: u16,
    },

    /// Network or stream failures (connect, read, premature close).
    #[error("connection error: {reason}")]
    Connection {
        /// Additional context about the error.
        reason: String,
    },

    /// The peer violated the wire protocol.
    #[error("protocol error: {reason}")]
    Protocol {
        /// Additional context about the violation.
        reason: String,
    },

    /// A network step exceeded its deadline.
    #[error("{operation} timed out")]
    Timeout {
        /// The step that did not complete in time.
        operation: String,
    },

    /// The remote tool itself reported a failure.
    #[error("remote tool failed: {reason}")]
    Remote {
        /// Error text reported by the remote side.
        reason: String,
    },
}

impl AdapterError {
    /// Convenience constructor for configuration issues.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for connection failures.
    #[must_use]
    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for protocol violations.
    #[must_use]
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for timeouts.
    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Convenience constructor for remote tool failures.
    #[must_use]
    pub fn remote(reason: impl Into<String>) -> Self {
        Self::Remote {
            reason: reason.into(),
        }
    }
}

/// Metadata describing one callable exposed by a remote server.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RemoteToolDescriptor {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default = "empty_object", rename = "inputSchema")]
    input_schema: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl RemoteToolDescriptor {
    /// Creates a descriptor with an empty input schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: empty_object(),
        }
    }

    /// Sets the human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the JSON schema of accepted arguments.
    #[must_use]
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Returns the declared tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the JSON schema of accepted arguments.
    #[must_use]
    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }
}

/// An open, authenticated session with a remote tool server.
///
/// Sessions are single-owner and used sequentially: discovery, then one call.
#[async_trait]
pub trait ToolSession: Send {
    /// Returns the remote catalog in server order.
    async fn list_tools(&mut self) -> AdapterResult<Vec<RemoteToolDescriptor>>;

    /// Invokes the named remote tool, returning its result value.
    async fn call_tool(&mut self, name: &str, arguments: Map<String, Value>)
    -> AdapterResult<Value>;

    /// Releases the transport. Must be safe to call from `Drop`.
    fn teardown(&mut self);
}

/// Opens sessions against a remote tool server.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Session type produced by this connector.
    type Session: ToolSession + 'static;

    /// Opens a session to `endpoint`, authenticating with `token`.
    async fn connect(
        &self,
        endpoint: &ServiceEndpoint,
        token: &IdentityToken,
    ) -> AdapterResult<Self::Session>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_parses_mcp_shape() {
        let json = r#"{
            "name": "add",
            "description": "Add two numbers",
            "inputSchema": {"type": "object", "properties": {"a": {"type": "integer"}}}
        }"#;
        let descriptor: RemoteToolDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.name(), "add");
        assert_eq!(descriptor.description(), Some("Add two numbers"));
        assert_eq!(descriptor.input_schema()["type"], "object");
    }

    #[test]
    fn descriptor_defaults_schema() {
        let descriptor: RemoteToolDescriptor = serde_json::from_str(r#"{"name":"ping"}"#).unwrap();
        assert_eq!(descriptor.input_schema(), &serde_json::json!({}));
        assert!(descriptor.description().is_none());
    }

    #[test]
    fn unauthorized_display_mentions_status() {
        let err = AdapterError::Unauthorized { status: 401 };
        assert_eq!(err.to_string(), "unauthorized: remote server answered 401");
    }
}
