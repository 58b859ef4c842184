//! Model Context Protocol (MCP) server implementation.
//!
//! Exposes registered tool groups to clients over newline-delimited
//! JSON-RPC 2.0.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          McpServer                           │
//! │                                                              │
//! │  ┌───────────┐   ┌────────────┐   ┌───────────────────────┐  │
//! │  │ Transport │──▶│ Dispatcher │──▶│ MethodHandler table   │  │
//! │  │  (lines)  │   │ + Session  │   │ or <group>.<tool>     │  │
//! │  └───────────┘   └────────────┘   └───────────────────────┘  │
//! │        ▲               │                     │               │
//! │        │               ▼                     ▼               │
//! │        │         ┌────────────┐   ┌───────────────────────┐  │
//! │        └─────────│ErrorMapper │   │ StreamingEngine       │  │
//! │                  └────────────┘   └───────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod dispatch;
pub mod errors;
pub mod handlers;
pub mod protocol;
pub mod server;
pub mod session;
pub mod streaming;
pub mod transport;

pub use dispatch::{Dispatcher, MethodHandler, RequestContext, ServerContext, ServerInfo};
pub use errors::ErrorMapper;
pub use protocol::{Envelope, JsonRpcError, JsonRpcResponse, Message, RequestId, MCP_PROTOCOL_VERSION};
pub use server::McpServer;
pub use session::SessionState;
pub use streaming::{StreamEvent, StreamingConfig, StreamingEngine};
