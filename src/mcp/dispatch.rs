//! Method dispatch.
//!
//! The [`Dispatcher`] owns a table of [`MethodHandler`]s keyed by method name.
//! For each inbound [`Message`] it:
//!
//! 1. Looks up a handler by exact method name. Failing that, a method of the
//!    form `<group>.<tool>` is routed to the tool group registry as a direct
//!    call. Anything else fails with `MethodNotFound`.
//! 2. Rejects the call with `InvalidRequest` if the route requires an
//!    initialised session and the session is not initialised. The handler is
//!    not invoked.
//! 3. Runs the handler with panics caught, so a misbehaving handler yields an
//!    internal error instead of taking down the connection.
//! 4. Turns the outcome into exactly one [`Envelope`] via the error mapper,
//!    or into nothing for notifications.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::capabilities::CapabilityRegistry;
use crate::error::McpError;
use crate::health::{ComponentHealth, HealthAggregator};
use crate::mcp::errors::ErrorMapper;
use crate::mcp::handlers;
use crate::mcp::protocol::{
    Envelope, JsonRpcResponse, Message, OutgoingNotification, RejectedMessage, SERVER_NAME,
};
use crate::mcp::session::{RequestTracker, SessionState};
use crate::mcp::streaming::StreamingEngine;
use crate::tools::{split_tool_name, ToolGroupRegistry};

/// Server information for the initialisation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl ServerInfo {
    /// Server info with a custom name and this crate's version.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self::named(SERVER_NAME)
    }
}

/// Process-wide state shared by every session. Read-only once built.
#[derive(Debug)]
pub struct ServerContext {
    /// Advertised server identity.
    pub info: ServerInfo,
    /// Enabled protocol features.
    pub capabilities: CapabilityRegistry,
    /// Registered tool groups.
    pub tools: ToolGroupRegistry,
    /// Stream admission and lifecycle.
    pub streaming: StreamingEngine,
    /// Component health checks.
    pub health: HealthAggregator,
    /// Failure-to-envelope conversion.
    pub errors: ErrorMapper,
}

impl ServerContext {
    /// Builds the context and registers the `tool_registry` and `streaming`
    /// health checks.
    #[must_use]
    pub fn new(
        info: ServerInfo,
        capabilities: CapabilityRegistry,
        tools: ToolGroupRegistry,
        streaming: StreamingEngine,
        errors: ErrorMapper,
    ) -> Self {
        let mut health = HealthAggregator::new(info.version.clone());

        let groups = tools.len();
        health.add_check("tool_registry", move || {
            ComponentHealth::healthy().with_metadata("groups", groups)
        });

        let engine = streaming.clone();
        health.add_check("streaming", move || engine.health());

        Self {
            info,
            capabilities,
            tools,
            streaming,
            health,
            errors,
        }
    }

    /// Adds an embedder-supplied health check.
    #[must_use]
    pub fn with_health_check<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> ComponentHealth + Send + Sync + 'static,
    {
        self.health.add_check(name, check);
        self
    }
}

/// Sends server-to-client notifications for the current connection.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    tx: Option<mpsc::Sender<String>>,
}

impl Notifier {
    /// A notifier that writes serialised lines into `tx`.
    #[must_use]
    pub const fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A notifier with no connection; every send is dropped.
    #[must_use]
    pub const fn detached() -> Self {
        Self { tx: None }
    }

    /// Sends a notification, waiting for room in the outbound queue.
    ///
    /// Returns `false` once the connection's writer has gone away.
    pub async fn notify(&self, method: &str, params: Value) -> bool {
        let Some(tx) = &self.tx else {
            return true;
        };
        let notification = OutgoingNotification::new(method, Some(params));
        match serde_json::to_string(&notification) {
            Ok(line) => tx.send(line).await.is_ok(),
            Err(e) => {
                warn!(method, error = %e, "Failed to serialise notification");
                true
            }
        }
    }
}

/// Per-request view of the connection a message arrived on.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Initialisation state of the connection.
    pub session: Arc<SessionState>,
    /// Requests in flight on the connection.
    pub requests: Arc<RequestTracker>,
    /// Fires when this request is cancelled or the connection closes.
    pub cancel: CancellationToken,
    /// Outbound notification channel.
    pub notifier: Notifier,
}

impl RequestContext {
    /// A context on `session` with a fresh token, an empty tracker and no
    /// notification channel.
    #[must_use]
    pub fn new(session: Arc<SessionState>) -> Self {
        Self {
            session,
            requests: Arc::new(RequestTracker::new()),
            cancel: CancellationToken::new(),
            notifier: Notifier::detached(),
        }
    }

    /// Replaces the cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replaces the in-flight request tracker.
    #[must_use]
    pub fn with_requests(mut self, requests: Arc<RequestTracker>) -> Self {
        self.requests = requests;
        self
    }

    /// Replaces the notification channel.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }
}

/// A protocol method implementation.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// The method name this handler serves.
    fn method(&self) -> &str;

    /// Whether the session must be initialised before this method is legal.
    fn requires_init(&self) -> bool {
        true
    }

    /// Handles the message. The `Ok` value becomes the response `result`.
    ///
    /// # Errors
    ///
    /// Any [`McpError`]; the dispatcher maps it to an error envelope.
    async fn handle(&self, ctx: &RequestContext, message: &Message) -> Result<Value, McpError>;
}

/// Routes messages to method handlers or tool groups.
pub struct Dispatcher {
    server: Arc<ServerContext>,
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
}

impl Dispatcher {
    /// A dispatcher with an empty handler table. Direct `<group>.<tool>`
    /// calls still route to the registry.
    #[must_use]
    pub fn new(server: Arc<ServerContext>) -> Self {
        Self {
            server,
            handlers: HashMap::new(),
        }
    }

    /// A dispatcher with every built-in protocol method registered.
    #[must_use]
    pub fn with_builtin_handlers(server: Arc<ServerContext>) -> Self {
        let mut dispatcher = Self::new(server);
        handlers::register_builtin(&mut dispatcher);
        dispatcher
    }

    /// Adds a handler, replacing any earlier handler for the same method.
    pub fn register<H>(&mut self, handler: H) -> &mut Self
    where
        H: MethodHandler + 'static,
    {
        let method = handler.method().to_string();
        if self
            .handlers
            .insert(method.clone(), Arc::new(handler))
            .is_some()
        {
            debug!(method = %method, "Replaced method handler");
        }
        self
    }

    /// The shared server context.
    #[must_use]
    pub const fn server(&self) -> &Arc<ServerContext> {
        &self.server
    }

    /// Registered method names, sorted.
    #[must_use]
    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<_> = self.handlers.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }

    /// Routes `message` and returns the handler's result.
    ///
    /// # Errors
    ///
    /// `MethodNotFound` when nothing matches, `NotInitialized` when the route
    /// needs an initialised session, `Internal` when the handler panics, or
    /// whatever the handler returns.
    pub async fn dispatch(&self, ctx: &RequestContext, message: &Message) -> Result<Value, McpError> {
        if let Some(handler) = self.handlers.get(&message.method) {
            if handler.requires_init() {
                require_initialized(ctx, &message.method)?;
            }
            return catch_panics(handler.handle(ctx, message)).await;
        }

        if split_tool_name(&message.method).is_some() {
            require_initialized(ctx, &message.method)?;
            return catch_panics(handlers::call_tool(
                &self.server,
                &message.method,
                message.params.clone(),
            ))
            .await;
        }

        Err(McpError::MethodNotFound(message.method.clone()))
    }

    /// Handles one message end to end.
    ///
    /// Returns `None` for notifications, otherwise the single envelope that
    /// answers the message, echoing its id.
    pub async fn handle(&self, ctx: &RequestContext, message: &Message) -> Option<Envelope> {
        debug!(
            session = %ctx.session.id(),
            method = %message.method,
            id = ?message.id,
            "Dispatching message"
        );

        let outcome = self.dispatch(ctx, message).await;

        if message.is_notification() {
            if let Err(e) = outcome {
                debug!(method = %message.method, error = %e, "Notification failed");
            }
            return None;
        }

        Some(match outcome {
            Ok(result) => Envelope::Response(JsonRpcResponse::success(message.id.clone(), result)),
            Err(e) => Envelope::Error(self.server.errors.envelope(message.id.clone(), &e)),
        })
    }

    /// The envelope answering a line that could not be parsed.
    #[must_use]
    pub fn reject(&self, rejected: &RejectedMessage) -> Envelope {
        Envelope::Error(
            self.server
                .errors
                .envelope(rejected.id.clone(), &rejected.error),
        )
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("methods", &self.methods())
            .field("server", &self.server)
            .finish()
    }
}

fn require_initialized(ctx: &RequestContext, method: &str) -> Result<(), McpError> {
    if ctx.session.is_initialized() {
        Ok(())
    } else {
        Err(McpError::NotInitialized {
            method: method.to_string(),
        })
    }
}

async fn catch_panics<F>(future: F) -> Result<Value, McpError>
where
    F: Future<Output = Result<Value, McpError>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => Err(McpError::Internal(format!(
            "handler panicked: {}",
            panic_message(&*panic)
        ))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

/// Serialises a handler result.
///
/// # Errors
///
/// Returns `Internal` if `value` cannot be represented as JSON.
pub fn to_result_value<T: Serialize>(value: &T) -> Result<Value, McpError> {
    serde_json::to_value(value)
        .map_err(|e| McpError::Internal(format!("failed to serialise result: {e}")))
}
