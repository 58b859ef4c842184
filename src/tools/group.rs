//! The tool group plugin contract.
//!
//! A tool group owns a namespace of tools. It is configured once at
//! registration and may then be invoked concurrently from many sessions;
//! groups holding mutable state synchronise it themselves.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::McpError;
use crate::tools::chunk::ChunkPayload;
use crate::tools::descriptor::ToolGroupMetadata;
use crate::tools::params::ToolParams;

/// Chunk payloads produced by a streaming invocation.
pub type ChunkStream = Pin<Box<dyn Stream<Item = ChunkPayload> + Send + 'static>>;

/// Content item in a tool call response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a unary tool call.
///
/// An unsuccessful result is a tool-level failure reported to the client as
/// a normal response with `isError`, not as a protocol error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool, so we must take &bool here
const fn is_false(b: &bool) -> bool {
    !*b
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates a successful result holding pretty-printed JSON.
    #[must_use]
    pub fn json(value: &Value) -> Self {
        Self::text(serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()))
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Whether the call succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !self.is_error
    }

    /// The error message of an unsuccessful result.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        if !self.is_error {
            return None;
        }
        self.content.iter().find_map(|c| match c {
            ToolContent::Text { text } => Some(text.as_str()),
        })
    }

    /// All text content joined with newlines.
    #[must_use]
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                ToolContent::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A plugin exposing a named set of tools.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use toolhost_mcp::error::McpError;
/// use toolhost_mcp::tools::{
///     ParameterType, ToolCallResult, ToolDescriptor, ToolGroup, ToolGroupMetadata, ToolParams,
/// };
///
/// struct Greeter {
///     metadata: ToolGroupMetadata,
/// }
///
/// #[async_trait]
/// impl ToolGroup for Greeter {
///     fn metadata(&self) -> &ToolGroupMetadata {
///         &self.metadata
///     }
///
///     async fn invoke(&self, tool: &str, params: ToolParams) -> Result<ToolCallResult, McpError> {
///         match tool {
///             "hello" => Ok(ToolCallResult::text("hello")),
///             other => Err(McpError::unknown_tool(self.name(), other)),
///         }
///     }
/// }
///
/// let greeter = Greeter {
///     metadata: ToolGroupMetadata::new(
///         "greeter",
///         vec![ToolDescriptor::new("hello", "Says hello")
///             .optional("name", ParameterType::String, "Who to greet")],
///     ),
/// };
/// assert_eq!(greeter.name(), "greeter");
/// ```
#[async_trait]
pub trait ToolGroup: Send + Sync {
    /// Group name and tool descriptors.
    fn metadata(&self) -> &ToolGroupMetadata;

    /// Group name, unique across the registry.
    fn name(&self) -> &str {
        &self.metadata().name
    }

    /// Receives the group's configuration blob, exactly once, before the
    /// first invocation. `None` when no configuration was supplied.
    ///
    /// # Errors
    ///
    /// Returns a description of why the configuration was rejected; the
    /// registry turns it into a startup failure.
    fn configure(&mut self, config: Option<&Value>) -> Result<(), String> {
        let _ = config;
        Ok(())
    }

    /// Invokes `tool` and returns its single result.
    ///
    /// # Errors
    ///
    /// `ToolNotFound` for an unknown tool, `InvalidParams` for missing or
    /// mistyped parameters, any other kind for unexpected failures.
    async fn invoke(&self, tool: &str, params: ToolParams) -> Result<ToolCallResult, McpError>;

    /// Invokes `tool` as a stream of chunk payloads.
    ///
    /// Producers should check `cancel` between chunks and stop promptly once
    /// it fires. The default adapts [`invoke`](Self::invoke): one `Content`
    /// chunk with the result followed by `Complete`, or a single `Error`
    /// chunk when the result is unsuccessful.
    ///
    /// # Errors
    ///
    /// Same kinds as [`invoke`](Self::invoke), raised before any chunk.
    async fn invoke_stream(
        &self,
        tool: &str,
        params: ToolParams,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, McpError> {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(Box::pin(futures::stream::empty::<ChunkPayload>())),
            result = self.invoke(tool, params) => result?,
        };
        Ok(single_result_stream(&result))
    }
}

/// Converts a unary result into a two-chunk (or one-chunk) stream.
#[must_use]
pub fn single_result_stream(result: &ToolCallResult) -> ChunkStream {
    let payloads = if result.is_success() {
        let content = serde_json::to_value(&result.content).unwrap_or(Value::Null);
        vec![
            ChunkPayload::content(content),
            ChunkPayload::complete(Value::Null),
        ]
    } else {
        vec![ChunkPayload::error(
            result.error_message().unwrap_or("tool failed"),
        )]
    };
    Box::pin(futures::stream::iter(payloads))
}
