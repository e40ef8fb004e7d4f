//! JSON-RPC 2.0 framing used by the MCP transport.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::traits::{AdapterError, AdapterResult};

/// Protocol version tag carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard error code for unknown methods.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Request identifier; this client always sends numbers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric identifier.
    Number(i64),
    /// String identifier (server-initiated requests may use these).
    Text(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

/// Outbound request expecting a response.
#[derive(Clone, Debug, Serialize)]
pub struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: RequestId,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl JsonRpcRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }

    /// Returns the request identifier.
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Returns the method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }
}

/// Outbound notification (no response expected).
#[derive(Clone, Debug, Serialize)]
pub struct JsonRpcNotification {
    jsonrpc: &'static str,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl JsonRpcNotification {
    /// Creates a notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}

/// Error object carried by failed responses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    /// Numeric error code.
    pub code: i64,
    /// Short description.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for JsonRpcErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// Response routed back to a waiting request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcErrorObject>,
}

impl JsonRpcResponse {
    /// Creates a successful response.
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response.
    #[must_use]
    pub fn failure(id: RequestId, error: JsonRpcErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Returns the identifier of the request this answers.
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Splits the response into its result or error object.
    ///
    /// # Errors
    ///
    /// Returns the error object when the server reported a failure.
    pub fn into_result(self) -> Result<Value, JsonRpcErrorObject> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Any message a server may push over the event stream.
#[derive(Clone, Debug, PartialEq)]
pub enum IncomingMessage {
    /// Answer to one of our requests.
    Response(JsonRpcResponse),
    /// Server-initiated request that needs an answer.
    Request {
        /// Identifier to echo in the answer.
        id: RequestId,
        /// Requested method.
        method: String,
        /// Optional parameters.
        params: Option<Value>,
    },
    /// Server-initiated notification.
    Notification {
        /// Notified method.
        method: String,
        /// Optional parameters.
        params: Option<Value>,
    },
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Option<RequestId>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

impl IncomingMessage {
    /// Parses one event payload, which may hold a single message or a batch.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Protocol`] when the payload is not valid JSON-RPC.
    pub fn parse_batch(payload: &str) -> AdapterResult<Vec<Self>> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|err| AdapterError::protocol(format!("invalid JSON-RPC payload: {err}")))?;
        match value {
            Value::Array(items) => items.into_iter().map(Self::from_value).collect(),
            other => Ok(vec![Self::from_value(other)?]),
        }
    }

    fn from_value(value: Value) -> AdapterResult<Self> {
        let raw: RawMessage = serde_json::from_value(value)
            .map_err(|err| AdapterError::protocol(format!("invalid JSON-RPC message: {err}")))?;

        if raw.jsonrpc.as_deref() != Some(JSONRPC_VERSION) {
            return Err(AdapterError::protocol("missing or unsupported jsonrpc version"));
        }

        match (raw.id, raw.method) {
            (Some(id), Some(method)) => Ok(Self::Request {
                id,
                method,
                params: raw.params,
            }),
            (None, Some(method)) => Ok(Self::Notification {
                method,
                params: raw.params,
            }),
            (Some(id), None) => Ok(Self::Response(JsonRpcResponse {
                jsonrpc: JSONRPC_VERSION,
                id,
                result: if raw.error.is_some() {
                    None
                } else {
                    Some(raw.result.unwrap_or(Value::Null))
                },
                error: raw.error,
            })),
            (None, None) => Err(AdapterError::protocol(
                "message has neither id nor method",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_without_empty_params() {
        let request = JsonRpcRequest::new(RequestId::Number(3), "tools/list", None);
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(encoded, json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list"}));
    }

    #[test]
    fn notification_has_no_id() {
        let note = JsonRpcNotification::new("notifications/initialized", None);
        let encoded = serde_json::to_value(&note).unwrap();
        assert!(encoded.get("id").is_none());
        assert_eq!(encoded["method"], "notifications/initialized");
    }

    #[test]
    fn parses_success_and_error_responses() {
        let ok = IncomingMessage::parse_batch(r#"{"jsonrpc":"2.0","id":1,"result":{"x":1}}"#)
            .unwrap()
            .remove(0);
        let IncomingMessage::Response(response) = ok else {
            panic!("expected response");
        };
        assert_eq!(response.id(), &RequestId::Number(1));
        assert_eq!(response.into_result().unwrap(), json!({"x": 1}));

        let failed = IncomingMessage::parse_batch(
            r#"{"jsonrpc":"2.0","id":"a","error":{"code":-32602,"message":"bad params"}}"#,
        )
        .unwrap()
        .remove(0);
        let IncomingMessage::Response(response) = failed else {
            panic!("expected response");
        };
        let error = response.into_result().expect_err("error response");
        assert_eq!(error.code, -32602);
        assert_eq!(error.to_string(), "bad params (code -32602)");
    }

    #[test]
    fn classifies_server_requests_and_notifications() {
        let messages = IncomingMessage::parse_batch(
            r#"[{"jsonrpc":"2.0","id":9,"method":"ping"},
                {"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info"}}]"#,
        )
        .unwrap();
        assert!(
            matches!(&messages[0], IncomingMessage::Request { method, .. } if method == "ping")
        );
        assert!(matches!(&messages[1], IncomingMessage::Notification { .. }));
    }

    #[test]
    fn null_result_is_preserved() {
        let message = IncomingMessage::parse_batch(r#"{"jsonrpc":"2.0","id":2,"result":null}"#)
            .unwrap()
            .remove(0);
        let IncomingMessage::Response(response) = message else {
            panic!("expected response");
        };
        assert_eq!(response.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn rejects_non_jsonrpc_payloads() {
        assert!(IncomingMessage::parse_batch("not json").is_err());
        assert!(IncomingMessage::parse_batch(r#"{"id":1,"result":{}}"#).is_err());
        assert!(IncomingMessage::parse_batch(r#"{"jsonrpc":"2.0"}"#).is_err());
    }
}
