//! Streaming chunk model.
//!
//! Producers yield [`ChunkPayload`]s. The streaming engine stamps each one
//! into a [`StreamChunk`] with the next sequence number and a timestamp, so
//! ordering and the single terminal chunk are enforced in one place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of a streaming chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkKind {
    /// Incremental result content.
    Content,
    /// Progress report.
    Progress,
    /// Out-of-band metadata.
    Metadata,
    /// Terminal failure.
    Error,
    /// Terminal success.
    Complete,
}

impl ChunkKind {
    /// Whether a chunk of this kind ends the stream.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Complete)
    }
}

/// What a producer emits, before sequencing.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPayload {
    /// Chunk kind.
    pub kind: ChunkKind,
    /// Content payload.
    pub content: Value,
    /// Progress in `[0.0, 1.0]`, clamped when stamped.
    pub progress: Option<f64>,
    /// Free-form metadata.
    pub metadata: Option<Map<String, Value>>,
}

impl ChunkPayload {
    const fn new(kind: ChunkKind, content: Value) -> Self {
        Self {
            kind,
            content,
            progress: None,
            metadata: None,
        }
    }

    /// A content chunk.
    #[must_use]
    pub fn content(content: impl Into<Value>) -> Self {
        Self::new(ChunkKind::Content, content.into())
    }

    /// A progress chunk.
    #[must_use]
    pub fn progress(progress: f64, message: impl Into<Value>) -> Self {
        Self {
            progress: Some(progress),
            ..Self::new(ChunkKind::Progress, message.into())
        }
    }

    /// A metadata chunk.
    #[must_use]
    pub const fn metadata(metadata: Map<String, Value>) -> Self {
        Self {
            kind: ChunkKind::Metadata,
            content: Value::Null,
            progress: None,
            metadata: Some(metadata),
        }
    }

    /// A terminal error chunk.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ChunkKind::Error, Value::String(message.into()))
    }

    /// A terminal completion chunk.
    #[must_use]
    pub fn complete(content: impl Into<Value>) -> Self {
        Self::new(ChunkKind::Complete, content.into())
    }
}

/// A sequenced chunk as delivered to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamChunk {
    /// Chunk kind.
    #[serde(rename = "type")]
    pub kind: ChunkKind,
    /// Content payload.
    pub content: Value,
    /// Whether this is the last chunk of the stream.
    pub is_final: bool,
    /// Position in the stream, starting at 0.
    pub sequence_number: u64,
    /// When the engine stamped the chunk.
    pub timestamp: DateTime<Utc>,
    /// Progress in `[0.0, 1.0]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Free-form metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl StreamChunk {
    /// Stamps a payload with its sequence number.
    #[must_use]
    pub fn stamp(payload: ChunkPayload, sequence_number: u64) -> Self {
        Self {
            is_final: payload.kind.is_terminal(),
            kind: payload.kind,
            content: payload.content,
            sequence_number,
            timestamp: Utc::now(),
            progress: payload
                .progress
                .map(|p| if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) }),
            metadata: payload.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn terminal_kinds() {
        assert!(ChunkKind::Error.is_terminal());
        assert!(ChunkKind::Complete.is_terminal());
        assert!(!ChunkKind::Content.is_terminal());
        assert!(!ChunkKind::Progress.is_terminal());
        assert!(!ChunkKind::Metadata.is_terminal());
    }

    #[test]
    fn stamp_sets_final_for_terminal_payloads() {
        let chunk = StreamChunk::stamp(ChunkPayload::complete("done"), 4);
        assert!(chunk.is_final);
        assert_eq!(chunk.sequence_number, 4);

        let chunk = StreamChunk::stamp(ChunkPayload::content("part"), 0);
        assert!(!chunk.is_final);
    }

    #[test]
    fn stamp_clamps_progress() {
        let high = StreamChunk::stamp(ChunkPayload::progress(1.7, "x"), 0);
        let low = StreamChunk::stamp(ChunkPayload::progress(-0.2, "x"), 1);
        let nan = StreamChunk::stamp(ChunkPayload::progress(f64::NAN, "x"), 2);
        assert_eq!(high.progress, Some(1.0));
        assert_eq!(low.progress, Some(0.0));
        assert_eq!(nan.progress, Some(0.0));
    }

    #[test]
    fn serialised_shape() {
        let mut meta = Map::new();
        meta.insert("phase".into(), json!("load"));
        let chunk = StreamChunk::stamp(ChunkPayload::metadata(meta), 2);
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value["type"], "Metadata");
        assert_eq!(value["sequenceNumber"], 2);
        assert_eq!(value["isFinal"], false);
        assert_eq!(value["metadata"]["phase"], "load");
        assert!(value.get("progress").is_none());
        assert!(value["timestamp"].is_string());
    }
}
