//! Conversion of request-time failures into JSON-RPC error envelopes.
//!
//! This is the only place an [`McpError`] becomes wire data. In production
//! mode internal failures are reduced to the generic message of their code
//! and no `data` is attached; otherwise the full detail is included.

use serde_json::json;
use tracing::{debug, error};

use crate::error::McpError;
use crate::mcp::protocol::{JsonRpcError, JsonRpcErrorData, RequestId};

/// Maps failures to error envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorMapper {
    production: bool,
}

impl ErrorMapper {
    /// Creates a mapper. `production` controls detail sanitisation.
    #[must_use]
    pub const fn new(production: bool) -> Self {
        Self { production }
    }

    /// Whether detail is sanitised.
    #[must_use]
    pub const fn is_production(&self) -> bool {
        self.production
    }

    /// Builds the error object for `err`.
    #[must_use]
    pub fn error_data(&self, err: &McpError) -> JsonRpcErrorData {
        let code = err.code();

        if self.production {
            let message = if err.is_client_facing() {
                err.to_string()
            } else {
                code.default_message().to_string()
            };
            return JsonRpcErrorData::with_message(code, message);
        }

        JsonRpcErrorData::with_message(code, err.to_string()).with_data(json!({
            "kind": kind_name(err),
            "detail": format!("{err:?}"),
        }))
    }

    /// Builds the full envelope for `err`, echoing `id`.
    #[must_use]
    pub fn envelope(&self, id: Option<RequestId>, err: &McpError) -> JsonRpcError {
        if err.is_client_facing() {
            debug!(id = ?id, error = %err, "Request failed");
        } else {
            error!(id = ?id, error = %err, "Request failed with internal error");
        }
        JsonRpcError::new(id, self.error_data(err))
    }
}

impl Default for ErrorMapper {
    fn default() -> Self {
        Self::new(true)
    }
}

const fn kind_name(err: &McpError) -> &'static str {
    match err {
        McpError::Parse(_) => "ParseError",
        McpError::InvalidRequest(_) => "InvalidRequest",
        McpError::NotInitialized { .. } => "NotInitialized",
        McpError::MethodNotFound(_) => "MethodNotFound",
        McpError::InvalidParams(_) => "InvalidParams",
        McpError::ToolNotFound(_) => "ToolNotFound",
        McpError::StreamCapacity { .. } => "StreamCapacity",
        McpError::StreamTimeout { .. } => "StreamTimeout",
        McpError::Internal(_) => "InternalError",
    }
}
