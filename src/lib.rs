//! toolhost-mcp: a plugin-extensible MCP tool server
//!
//! Clients send JSON-RPC requests naming a protocol method or a tool. The
//! server routes each request to a built-in handler or to a registered tool
//! group and answers with a result or a structured error. Tools can also
//! stream incremental chunks instead of a single result.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`capabilities`]: Optional protocol features enabled at startup
//! - [`health`]: Component health aggregation
//! - [`tools`]: Tool descriptors, the tool group contract and registry
//! - [`groups`]: Built-in tool groups
//! - [`mcp`]: MCP protocol implementation

pub mod capabilities;
pub mod config;
pub mod error;
pub mod groups;
pub mod health;
pub mod mcp;
pub mod tools;
