//! The `echo` tool group.

use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::McpError;
use crate::tools::params::{optional_u64, required_str};
use crate::tools::{
    single_result_stream, ChunkPayload, ChunkStream, ParameterType, ToolCallResult,
    ToolDescriptor, ToolGroup, ToolGroupMetadata, ToolParams,
};

/// Maximum value of the `repeat` parameter.
const MAX_REPEAT: u64 = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EchoConfig {
    /// Pause between streamed words.
    #[serde(default)]
    delay_ms: u64,
}

/// Echoes messages back, optionally word by word.
///
/// Configuration: `{ "delay_ms": n }` pauses `n` milliseconds before each
/// streamed word.
#[derive(Debug)]
pub struct EchoGroup {
    metadata: ToolGroupMetadata,
    delay: Duration,
}

impl EchoGroup {
    /// Group name.
    pub const NAME: &'static str = "echo";

    /// Creates the group with no streaming delay.
    #[must_use]
    pub fn new() -> Self {
        Self {
            metadata: ToolGroupMetadata::new(
                Self::NAME,
                vec![
                    ToolDescriptor::new("say", "Returns the message, optionally repeated")
                        .required("message", ParameterType::String, "Text to echo")
                        .optional(
                            "repeat",
                            ParameterType::Number,
                            "How many times to repeat the message (default 1)",
                        ),
                    ToolDescriptor::new("stream", "Streams the message back one word at a time")
                        .required("message", ParameterType::String, "Text to stream"),
                ],
            ),
            delay: Duration::ZERO,
        }
    }

    /// The configured per-word delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    fn say(params: &ToolParams) -> Result<ToolCallResult, McpError> {
        let message = required_str(params, "message")?;
        let repeat = optional_u64(params, "repeat")?.unwrap_or(1);
        if repeat == 0 || repeat > MAX_REPEAT {
            return Err(McpError::InvalidParams(format!(
                "parameter 'repeat' must be between 1 and {MAX_REPEAT}"
            )));
        }

        let mut parts = Vec::new();
        for _ in 0..repeat {
            parts.push(message);
        }
        Ok(ToolCallResult::text(parts.join(" ")))
    }
}

impl Default for EchoGroup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolGroup for EchoGroup {
    fn metadata(&self) -> &ToolGroupMetadata {
        &self.metadata
    }

    fn configure(&mut self, config: Option<&Value>) -> Result<(), String> {
        let config: EchoConfig = match config {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| e.to_string())?,
            None => EchoConfig::default(),
        };
        self.delay = Duration::from_millis(config.delay_ms);
        Ok(())
    }

    async fn invoke(&self, tool: &str, params: ToolParams) -> Result<ToolCallResult, McpError> {
        match tool {
            "say" => Self::say(&params),
            "stream" => Ok(ToolCallResult::text(required_str(&params, "message")?)),
            other => Err(McpError::unknown_tool(Self::NAME, other)),
        }
    }

    async fn invoke_stream(
        &self,
        tool: &str,
        params: ToolParams,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, McpError> {
        if tool != "stream" {
            let result = self.invoke(tool, params).await?;
            return Ok(single_result_stream(&result));
        }

        let words: Vec<String> = required_str(&params, "message")?
            .split_whitespace()
            .map(str::to_string)
            .collect();
        Ok(Box::pin(word_stream(words, self.delay, cancel)))
    }
}

#[allow(clippy::cast_precision_loss)] // word counts are far below 2^52
fn word_stream(
    words: Vec<String>,
    delay: Duration,
    cancel: CancellationToken,
) -> impl futures::Stream<Item = ChunkPayload> + Send + 'static {
    stream! {
        let total = words.len();
        let mut metadata = Map::new();
        metadata.insert("words".to_string(), json!(total));
        yield ChunkPayload::metadata(metadata);

        for (index, word) in words.into_iter().enumerate() {
            if !delay.is_zero() {
                tokio::select! {
                    () = cancel.cancelled() => {}
                    () = tokio::time::sleep(delay) => {}
                }
            }
            if cancel.is_cancelled() {
                break;
            }
            yield ChunkPayload::content(word);
            yield ChunkPayload::progress((index + 1) as f64 / total as f64, json!({ "word": index + 1 }));
        }

        if !cancel.is_cancelled() {
            yield ChunkPayload::complete(json!({ "words": total }));
        }
    }
}
