//! JSON-RPC 2.0 message types for the MCP protocol.
//!
//! # Message Types
//!
//! - **Message**: an inbound request or notification. The `id` is optional
//!   and opaque; it is echoed back unchanged (or as `null` when absent).
//! - **Response**: a success reply carrying `result`.
//! - **Error**: a failure reply carrying `{ code, message, data? }`.
//! - **Notification**: a one-way server-to-client message (stream chunks,
//!   keep-alives).
//!
//! Inbound `jsonrpc` is optional; if present it must be `"2.0"`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::McpError;

/// The MCP protocol version this implementation supports.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name for capability negotiation.
pub const SERVER_NAME: &str = "toolhost-mcp";

/// A JSON-RPC 2.0 request ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(i64),
    /// String request ID.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

/// An inbound message. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Message {
    /// Request identifier, absent for notifications.
    #[serde(default)]
    pub id: Option<RequestId>,

    /// The method to invoke.
    pub method: String,

    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

impl Message {
    /// Creates a request message.
    #[must_use]
    pub fn request(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    /// Creates a message without an id.
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: None,
            method: method.into(),
            params,
        }
    }

    /// Whether this is a `notifications/*` message without an id.
    ///
    /// Such messages never receive a response.
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.id.is_none() && self.method.starts_with("notifications/")
    }

    /// Deserialises the parameters into `T`.
    ///
    /// Missing parameters are treated as an empty object so that types whose
    /// fields all default still deserialise.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParams` if the parameters do not match `T`.
    pub fn parse_params<T: serde::de::DeserializeOwned>(&self) -> Result<T, McpError> {
        let params = self
            .params
            .clone()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        serde_json::from_value(params)
            .map_err(|e| McpError::InvalidParams(format!("invalid params for '{}': {e}", self.method)))
    }
}

/// An outgoing JSON-RPC 2.0 notification (server to client).
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingNotification {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The notification method.
    pub method: String,

    /// Optional parameters for the notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl OutgoingNotification {
    /// Creates a new outgoing notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// A successful JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this response corresponds to.
    pub id: Option<RequestId>,

    /// The result of the method call.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Creates a new success response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Value is not const-compatible
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result,
        }
    }
}

/// Protocol error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The JSON sent is not a valid Request object, or is out of order.
    InvalidRequest,
    /// The method does not exist or is not available.
    MethodNotFound,
    /// Invalid method parameters.
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
    /// Too many concurrent streams.
    ServerBusy,
    /// A stream ran past its maximum duration.
    Timeout,
}

impl ErrorCode {
    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ServerBusy => -32000,
            Self::Timeout => -32001,
        }
    }

    /// Returns the default message for this error code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ServerBusy => "Server busy",
            Self::Timeout => "Request timed out",
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcErrorData {
    /// The error code.
    pub code: i32,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    /// Creates a new error from an error code.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.default_message().to_string(),
            data: None,
        }
    }

    /// Creates a new error with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Adds additional data to the error.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A JSON-RPC 2.0 error response.
///
/// `id` is always serialised, as `null` when the inbound id was absent or
/// could not be determined.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this error corresponds to (if known).
    pub id: Option<RequestId>,

    /// The error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Creates a new error response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // JsonRpcErrorData contains String
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            error,
        }
    }
}

/// A final reply to an inbound message.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    /// Success reply.
    Response(JsonRpcResponse),
    /// Failure reply.
    Error(JsonRpcError),
}

impl Envelope {
    /// The echoed request id.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Response(resp) => resp.id.as_ref(),
            Self::Error(err) => err.id.as_ref(),
        }
    }

    /// The error object, if this is a failure reply.
    #[must_use]
    pub const fn error(&self) -> Option<&JsonRpcErrorData> {
        match self {
            Self::Response(_) => None,
            Self::Error(err) => Some(&err.error),
        }
    }

    /// The result payload, if this is a success reply.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        match self {
            Self::Response(resp) => Some(&resp.result),
            Self::Error(_) => None,
        }
    }
}

/// An inbound line that could not be turned into a [`Message`].
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedMessage {
    /// The id, when it could be recovered from the raw object.
    pub id: Option<RequestId>,
    /// Why the message was rejected.
    pub error: McpError,
}

/// Parses a JSON string into an inbound message.
///
/// # Errors
///
/// Returns `Parse` when the input is not a JSON object and `InvalidRequest`
/// when the object is not a well-formed message. The id is recovered where
/// possible so the error can echo it.
pub fn parse_message(json: &str) -> Result<Message, RejectedMessage> {
    let value: Value = serde_json::from_str(json).map_err(|e| RejectedMessage {
        id: None,
        error: McpError::Parse(e.to_string()),
    })?;

    let Some(obj) = value.as_object() else {
        return Err(RejectedMessage {
            id: None,
            error: McpError::Parse("message must be a JSON object".to_string()),
        });
    };

    let id = obj
        .get("id")
        .and_then(|raw| serde_json::from_value::<RequestId>(raw.clone()).ok());

    let reject = |reason: &str| RejectedMessage {
        id: id.clone(),
        error: McpError::InvalidRequest(reason.to_string()),
    };

    if let Some(version) = obj.get("jsonrpc") {
        if version.as_str() != Some("2.0") {
            return Err(reject("jsonrpc field must be \"2.0\""));
        }
    }

    if obj.get("id").is_some_and(|raw| !raw.is_null()) && id.is_none() {
        return Err(reject("id must be a string or an integer"));
    }

    let message: Message =
        serde_json::from_value(value).map_err(|e| reject(&format!("malformed message: {e}")))?;

    if message.method.is_empty() {
        return Err(reject("method field cannot be empty"));
    }

    Ok(message)
}
