//! Built-in protocol method handlers.
//!
//! | method                      | needs init | result                        |
//! |-----------------------------|------------|-------------------------------|
//! | `initialize`                | no         | version, capabilities, info   |
//! | `notifications/initialized` | no         | none (notification)           |
//! | `notifications/cancelled`   | no         | none (notification)           |
//! | `ping`                      | no         | `{}`                          |
//! | `health`                    | no         | overall health snapshot       |
//! | `capabilities/list`         | yes        | features and tool catalog     |
//! | `tools/list`                | yes        | `{ tools }`                   |
//! | `tools/call`                | yes        | tool call result              |
//! | `tools/stream`              | yes        | `{ chunks, completed }`       |

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::error::McpError;
use crate::mcp::dispatch::{to_result_value, Dispatcher, MethodHandler, RequestContext, ServerContext};
use crate::mcp::protocol::{Message, RequestId, MCP_PROTOCOL_VERSION};
use crate::mcp::session::ClientInfo;
use crate::mcp::streaming::StreamEvent;
use crate::tools::params::into_params;

/// Notification carrying one stream chunk.
pub const STREAM_CHUNK_METHOD: &str = "notifications/stream/chunk";

/// Notification sent when a stream has been idle for a heartbeat interval.
pub const STREAM_KEEPALIVE_METHOD: &str = "notifications/stream/keepalive";

/// Registers every built-in handler on `dispatcher`.
pub fn register_builtin(dispatcher: &mut Dispatcher) {
    let server = Arc::clone(dispatcher.server());
    dispatcher
        .register(InitializeHandler {
            server: Arc::clone(&server),
        })
        .register(InitializedHandler)
        .register(CancelledHandler)
        .register(PingHandler)
        .register(HealthHandler {
            server: Arc::clone(&server),
        })
        .register(CapabilitiesListHandler {
            server: Arc::clone(&server),
        })
        .register(ToolsListHandler {
            server: Arc::clone(&server),
        })
        .register(ToolsCallHandler {
            server: Arc::clone(&server),
        })
        .register(ToolsStreamHandler { server });
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    #[serde(default)]
    protocol_version: Option<String>,
    #[serde(default)]
    client_info: Option<ClientInfo>,
}

/// Parameters for `tools/call` and `tools/stream`.
#[derive(Debug, Clone, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelledParams {
    request_id: RequestId,
    #[serde(default)]
    reason: Option<String>,
}

fn require_tools(server: &ServerContext) -> Result<(), McpError> {
    if server.capabilities.supports_tools() {
        Ok(())
    } else {
        Err(McpError::MethodNotFound(
            "tools capability is not enabled".to_string(),
        ))
    }
}

/// Invokes a tool by advertised name with raw arguments.
///
/// Shared by `tools/call` and direct `<group>.<tool>` calls.
///
/// # Errors
///
/// `MethodNotFound` when tools are disabled, `InvalidParams` when the
/// arguments are not an object, and whatever the registry or tool raises.
pub async fn call_tool(
    server: &ServerContext,
    name: &str,
    arguments: Option<Value>,
) -> Result<Value, McpError> {
    require_tools(server)?;
    let params = into_params(arguments)?;
    let result = server.tools.invoke(name, params).await?;
    if !result.is_success() {
        debug!(tool = %name, error = ?result.error_message(), "Tool reported failure");
    }
    to_result_value(&result)
}

struct InitializeHandler {
    server: Arc<ServerContext>,
}

#[async_trait]
impl MethodHandler for InitializeHandler {
    fn method(&self) -> &str {
        "initialize"
    }

    fn requires_init(&self) -> bool {
        false
    }

    async fn handle(&self, ctx: &RequestContext, message: &Message) -> Result<Value, McpError> {
        let params: InitializeParams = message.parse_params()?;
        let client = params.client_info;

        if !ctx.session.initialize_with(client.clone()) {
            return Err(McpError::InvalidRequest(
                "session already initialised".to_string(),
            ));
        }

        info!(
            session = %ctx.session.id(),
            client = ?client.as_ref().map(|c| c.name.as_str()),
            requested_version = ?params.protocol_version,
            "Session initialised"
        );

        Ok(json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": self.server.capabilities.advertisement(),
            "serverInfo": self.server.info,
        }))
    }
}

struct InitializedHandler;

#[async_trait]
impl MethodHandler for InitializedHandler {
    fn method(&self) -> &str {
        "notifications/initialized"
    }

    fn requires_init(&self) -> bool {
        false
    }

    async fn handle(&self, ctx: &RequestContext, _message: &Message) -> Result<Value, McpError> {
        debug!(session = %ctx.session.id(), "Client confirmed initialisation");
        Ok(Value::Null)
    }
}

struct CancelledHandler;

#[async_trait]
impl MethodHandler for CancelledHandler {
    fn method(&self) -> &str {
        "notifications/cancelled"
    }

    fn requires_init(&self) -> bool {
        false
    }

    async fn handle(&self, ctx: &RequestContext, message: &Message) -> Result<Value, McpError> {
        let params: CancelledParams = message.parse_params()?;
        let found = ctx.requests.cancel(&params.request_id);
        debug!(
            request = %params.request_id,
            reason = ?params.reason,
            found,
            "Cancellation requested"
        );
        Ok(Value::Null)
    }
}

struct PingHandler;

#[async_trait]
impl MethodHandler for PingHandler {
    fn method(&self) -> &str {
        "ping"
    }

    fn requires_init(&self) -> bool {
        false
    }

    async fn handle(&self, _ctx: &RequestContext, _message: &Message) -> Result<Value, McpError> {
        Ok(json!({}))
    }
}

struct HealthHandler {
    server: Arc<ServerContext>,
}

#[async_trait]
impl MethodHandler for HealthHandler {
    fn method(&self) -> &str {
        "health"
    }

    fn requires_init(&self) -> bool {
        false
    }

    async fn handle(&self, _ctx: &RequestContext, _message: &Message) -> Result<Value, McpError> {
        to_result_value(&self.server.health.check())
    }
}

struct CapabilitiesListHandler {
    server: Arc<ServerContext>,
}

#[async_trait]
impl MethodHandler for CapabilitiesListHandler {
    fn method(&self) -> &str {
        "capabilities/list"
    }

    async fn handle(&self, _ctx: &RequestContext, _message: &Message) -> Result<Value, McpError> {
        let capabilities = &self.server.capabilities;
        let tools = if capabilities.supports_tools() {
            self.server.tools.catalog()
        } else {
            Vec::new()
        };
        Ok(json!({
            "features": capabilities.features(),
            "tools": tools,
        }))
    }
}

struct ToolsListHandler {
    server: Arc<ServerContext>,
}

#[async_trait]
impl MethodHandler for ToolsListHandler {
    fn method(&self) -> &str {
        "tools/list"
    }

    async fn handle(&self, _ctx: &RequestContext, _message: &Message) -> Result<Value, McpError> {
        require_tools(&self.server)?;
        Ok(json!({ "tools": self.server.tools.catalog() }))
    }
}

struct ToolsCallHandler {
    server: Arc<ServerContext>,
}

#[async_trait]
impl MethodHandler for ToolsCallHandler {
    fn method(&self) -> &str {
        "tools/call"
    }

    async fn handle(&self, _ctx: &RequestContext, message: &Message) -> Result<Value, McpError> {
        let params: ToolCallParams = message.parse_params()?;
        call_tool(&self.server, &params.name, params.arguments).await
    }
}

/// Runs a streaming invocation, forwarding each chunk and keep-alive as a
/// notification. The final result counts the chunks and records whether the
/// terminal chunk was reached.
struct ToolsStreamHandler {
    server: Arc<ServerContext>,
}

#[async_trait]
impl MethodHandler for ToolsStreamHandler {
    fn method(&self) -> &str {
        "tools/stream"
    }

    async fn handle(&self, ctx: &RequestContext, message: &Message) -> Result<Value, McpError> {
        require_tools(&self.server)?;
        let params: ToolCallParams = message.parse_params()?;
        let arguments = into_params(params.arguments)?;

        // Bounds notification writes too; a stalled client must not hold the permit.
        let limit = self.server.streaming.config().max_duration;
        let deadline = Instant::now() + limit;

        let mut events = self
            .server
            .streaming
            .open_tool(&self.server.tools, &params.name, arguments, &ctx.cancel)
            .await?;

        let request_id = message.id.clone();
        let mut chunks = 0_u64;
        let mut completed = false;

        while let Some(event) = events.next().await {
            let (method, notification) = match event? {
                StreamEvent::Chunk(chunk) => {
                    chunks += 1;
                    completed = chunk.is_final;
                    let notification = json!({
                        "requestId": request_id,
                        "chunk": to_result_value(&chunk)?,
                    });
                    (STREAM_CHUNK_METHOD, notification)
                }
                StreamEvent::KeepAlive => {
                    (STREAM_KEEPALIVE_METHOD, json!({ "requestId": request_id }))
                }
            };

            let delivered = tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => false,
                () = sleep_until(deadline) => {
                    warn!(tool = %params.name, ?limit, "Stream notification timed out");
                    return Err(McpError::StreamTimeout { limit });
                }
                delivered = ctx.notifier.notify(method, notification) => delivered,
            };
            if !delivered {
                debug!(tool = %params.name, "Connection closed or request cancelled during stream");
                break;
            }
        }

        debug!(tool = %params.name, chunks, completed, "Stream finished");
        Ok(json!({ "chunks": chunks, "completed": completed }))
    }
}
