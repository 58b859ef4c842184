//! Tool descriptors, the tool group plugin contract, and the group registry.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   ToolGroupRegistry                      │
//! │                                                          │
//! │   "math.add" ──split──▶ ("math", "add")                  │
//! │                            │                             │
//! │                            ▼                             │
//! │   ┌────────────┐   ┌────────────┐   ┌────────────┐       │
//! │   │ ToolGroup  │   │ ToolGroup  │   │ ToolGroup  │       │
//! │   │   "echo"   │   │   "math"   │   │    ...     │       │
//! │   └────────────┘   └────────────┘   └────────────┘       │
//! │         │ invoke / invoke_stream                         │
//! │         ▼                                                │
//! │   ToolCallResult  |  ChunkPayload stream                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Groups register explicitly at startup with their descriptor tables; there
//! is no runtime discovery.

pub mod chunk;
pub mod descriptor;
pub mod group;
pub mod params;
pub mod registry;

pub use chunk::{ChunkKind, ChunkPayload, StreamChunk};
pub use descriptor::{
    qualified_name, split_tool_name, InputSchema, ParameterType, PropertySchema, ToolDefinition,
    ToolDescriptor, ToolGroupMetadata, ToolParameterDescriptor, GROUP_SEPARATOR,
};
pub use group::{single_result_stream, ChunkStream, ToolCallResult, ToolContent, ToolGroup};
pub use params::ToolParams;
pub use registry::{ToolGroupRegistry, ToolGroupRegistryBuilder};
