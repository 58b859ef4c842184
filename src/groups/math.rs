//! The `math` tool group.

use async_stream::stream;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::error::McpError;
use crate::tools::params::{required_f64, required_u64};
use crate::tools::{
    single_result_stream, ChunkPayload, ChunkStream, ParameterType, ToolCallResult,
    ToolDescriptor, ToolGroup, ToolGroupMetadata, ToolParams,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MathConfig {
    #[serde(default = "default_max_series_terms")]
    max_series_terms: u64,
}

impl Default for MathConfig {
    fn default() -> Self {
        Self {
            max_series_terms: default_max_series_terms(),
        }
    }
}

const fn default_max_series_terms() -> u64 {
    10_000
}

/// Basic arithmetic.
///
/// Configuration: `{ "max_series_terms": n }` caps the `count` accepted by
/// `sum_series` (default 10000).
#[derive(Debug)]
pub struct MathGroup {
    metadata: ToolGroupMetadata,
    max_series_terms: u64,
}

impl MathGroup {
    /// Group name.
    pub const NAME: &'static str = "math";

    /// Creates the group with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self {
            metadata: ToolGroupMetadata::new(
                Self::NAME,
                vec![
                    ToolDescriptor::new("add", "Adds two numbers")
                        .required("a", ParameterType::Number, "First addend")
                        .required("b", ParameterType::Number, "Second addend"),
                    ToolDescriptor::new("divide", "Divides a by b")
                        .required("a", ParameterType::Number, "Dividend")
                        .required("b", ParameterType::Number, "Divisor"),
                    ToolDescriptor::new("sum_series", "Sums 1..=count, streaming running totals")
                        .required("count", ParameterType::Number, "Number of terms"),
                ],
            ),
            max_series_terms: default_max_series_terms(),
        }
    }

    fn series_count(&self, params: &ToolParams) -> Result<u64, McpError> {
        let count = required_u64(params, "count")?;
        if count > self.max_series_terms {
            return Err(McpError::InvalidParams(format!(
                "parameter 'count' must not exceed {}",
                self.max_series_terms
            )));
        }
        Ok(count)
    }
}

impl Default for MathGroup {
    fn default() -> Self {
        Self::new()
    }
}

fn number_result(value: f64) -> ToolCallResult {
    ToolCallResult::json(&json!({ "result": value }))
}

#[async_trait]
impl ToolGroup for MathGroup {
    fn metadata(&self) -> &ToolGroupMetadata {
        &self.metadata
    }

    fn configure(&mut self, config: Option<&Value>) -> Result<(), String> {
        let config: MathConfig = match config {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| e.to_string())?,
            None => MathConfig::default(),
        };
        if config.max_series_terms == 0 {
            return Err("max_series_terms must be at least 1".to_string());
        }
        self.max_series_terms = config.max_series_terms;
        Ok(())
    }

    async fn invoke(&self, tool: &str, params: ToolParams) -> Result<ToolCallResult, McpError> {
        match tool {
            "add" => {
                let a = required_f64(&params, "a")?;
                let b = required_f64(&params, "b")?;
                Ok(number_result(a + b))
            }
            "divide" => {
                let a = required_f64(&params, "a")?;
                let b = required_f64(&params, "b")?;
                if b == 0.0 {
                    return Ok(ToolCallResult::error("division by zero"));
                }
                Ok(number_result(a / b))
            }
            "sum_series" => {
                let count = self.series_count(&params)?;
                Ok(ToolCallResult::json(&json!({ "total": series_total(count) })))
            }
            other => Err(McpError::unknown_tool(Self::NAME, other)),
        }
    }

    async fn invoke_stream(
        &self,
        tool: &str,
        params: ToolParams,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, McpError> {
        if tool != "sum_series" {
            let result = self.invoke(tool, params).await?;
            return Ok(single_result_stream(&result));
        }
        let count = self.series_count(&params)?;
        Ok(Box::pin(series_stream(count, cancel)))
    }
}

const fn series_total(count: u64) -> u64 {
    count.saturating_mul(count.saturating_add(1)) / 2
}

#[allow(clippy::cast_precision_loss)] // term counts are capped well below 2^52
fn series_stream(
    count: u64,
    cancel: CancellationToken,
) -> impl futures::Stream<Item = ChunkPayload> + Send + 'static {
    stream! {
        let mut total = 0_u64;
        for term in 1..=count {
            if cancel.is_cancelled() {
                break;
            }
            total = total.saturating_add(term);
            yield ChunkPayload::content(json!({ "term": term, "total": total }));
            yield ChunkPayload::progress(term as f64 / count as f64, json!({ "term": term }));
            tokio::task::yield_now().await;
        }

        if !cancel.is_cancelled() {
            yield ChunkPayload::complete(json!({ "total": total }));
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::tools::ChunkKind;

    fn params(value: Value) -> ToolParams {
        crate::tools::params::into_params(Some(value)).unwrap()
    }

    #[tokio::test]
    async fn add_numbers() {
        let result = MathGroup::new()
            .invoke("add", params(json!({"a": 2, "b": 3.5})))
            .await
            .unwrap();
        assert!(result.is_success());
        assert!(result.joined_text().contains("5.5"));
    }

    #[tokio::test]
    async fn divide_by_zero_is_a_tool_failure() {
        let result = MathGroup::new()
            .invoke("divide", params(json!({"a": 1, "b": 0})))
            .await
            .unwrap();
        assert!(!result.is_success());
        assert_eq!(result.error_message(), Some("division by zero"));
    }

    #[tokio::test]
    async fn missing_operand_is_invalid_params() {
        let err = MathGroup::new()
            .invoke("add", params(json!({"a": 1})))
            .await
            .unwrap_err();
        assert_eq!(err, McpError::missing_param("b"));
    }

    #[tokio::test]
    async fn wrong_type_is_invalid_params() {
        let err = MathGroup::new()
            .invoke("add", params(json!({"a": "one", "b": 2})))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn sum_series_unary() {
        let result = MathGroup::new()
            .invoke("sum_series", params(json!({"count": 4})))
            .await
            .unwrap();
        assert!(result.joined_text().contains("10"));
    }

    #[tokio::test]
    async fn sum_series_streams_running_totals() {
        let payloads: Vec<_> = MathGroup::new()
            .invoke_stream(
                "sum_series",
                params(json!({"count": 3})),
                CancellationToken::new(),
            )
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(payloads.len(), 7);
        assert_eq!(payloads[4].content["total"], 6);
        assert_eq!(payloads[5].progress, Some(1.0));
        assert_eq!(payloads[6].kind, ChunkKind::Complete);
        assert_eq!(payloads[6].content["total"], 6);
    }

    #[tokio::test]
    async fn divide_by_zero_streams_error_chunk() {
        let payloads: Vec<_> = MathGroup::new()
            .invoke_stream(
                "divide",
                params(json!({"a": 1, "b": 0})),
                CancellationToken::new(),
            )
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].kind, ChunkKind::Error);
    }

    #[tokio::test]
    async fn series_limit_is_configurable() {
        let mut group = MathGroup::new();
        group
            .configure(Some(&json!({"max_series_terms": 2})))
            .unwrap();
        let err = group
            .invoke("sum_series", params(json!({"count": 3})))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidParams(_)));
    }

    #[test]
    fn zero_series_limit_is_rejected() {
        let mut group = MathGroup::new();
        assert!(group
            .configure(Some(&json!({"max_series_terms": 0})))
            .is_err());
    }
}
