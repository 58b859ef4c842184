//! Error types for toolhost-mcp.
//!
//! Startup failures ([`ConfigError`], [`RegistryError`]) are fatal and end the
//! process before any client is served. Request-time failures ([`McpError`])
//! are always converted into a JSON-RPC error envelope at the dispatcher
//! boundary and never reach the transport unmapped.
//!
//! # Security Note
//!
//! `McpError` display strings may carry internal detail (paths, tool names,
//! panic payloads). The error mapper only exposes them when the server runs
//! outside production mode.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::mcp::protocol::ErrorCode;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors raised while building the tool group registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Two groups declared the same name.
    #[error("duplicate tool group: {group}")]
    DuplicateGroup {
        /// The conflicting group name.
        group: String,
    },

    /// A group declared the same tool twice.
    #[error("duplicate tool '{tool}' in group '{group}'")]
    DuplicateTool {
        /// Owning group.
        group: String,
        /// The conflicting tool name.
        tool: String,
    },

    /// A group or tool name is empty or contains the group separator.
    #[error("invalid name '{name}': {reason}")]
    InvalidName {
        /// The offending name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The group's configuration hook rejected its configuration.
    #[error("tool group '{group}' rejected its configuration: {message}")]
    Configuration {
        /// The group that failed to configure.
        group: String,
        /// Description from the group.
        message: String,
    },

    /// Configuration was supplied for a group that was never registered.
    #[error("configuration supplied for unknown tool group: {group}")]
    UnknownGroupConfig {
        /// The unmatched group name.
        group: String,
    },
}

/// Which half of a `<group>.<tool>` name failed to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolLookup {
    /// No group with this name is registered.
    UnknownGroup {
        /// Requested group name.
        group: String,
    },
    /// The group exists but does not recognise the tool.
    UnknownTool {
        /// Owning group.
        group: String,
        /// Requested local tool name.
        tool: String,
    },
}

impl std::fmt::Display for ToolLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownGroup { group } => write!(f, "unknown tool group '{group}'"),
            Self::UnknownTool { group, tool } => {
                write!(f, "unknown tool '{tool}' in group '{group}'")
            }
        }
    }
}

/// Request-time failure kinds.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum McpError {
    /// The inbound bytes were not a JSON object.
    #[error("parse error: {0}")]
    Parse(String),

    /// Structurally valid but semantically illegal request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A method that requires an initialised session was called too early.
    #[error("session not initialised: '{method}' requires a prior initialize")]
    NotInitialized {
        /// The rejected method.
        method: String,
    },

    /// No handler or tool route matches the method name.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Parameters are missing or have the wrong type.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The tool name did not resolve to a group or to a tool inside a group.
    #[error("tool not found: {0}")]
    ToolNotFound(ToolLookup),

    /// The concurrent stream ceiling has been reached.
    #[error("stream capacity exhausted ({limit} streams open)")]
    StreamCapacity {
        /// The configured ceiling.
        limit: usize,
    },

    /// A stream ran past its maximum duration.
    #[error("stream exceeded maximum duration of {}ms", .limit.as_millis())]
    StreamTimeout {
        /// The configured maximum.
        limit: Duration,
    },

    /// Catch-all for unexpected failures, including handler panics.
    #[error("internal error: {0}")]
    Internal(String),
}

impl McpError {
    /// Shorthand for an unknown group failure.
    #[must_use]
    pub fn unknown_group(group: impl Into<String>) -> Self {
        Self::ToolNotFound(ToolLookup::UnknownGroup {
            group: group.into(),
        })
    }

    /// Shorthand for an unknown tool within a known group.
    #[must_use]
    pub fn unknown_tool(group: impl Into<String>, tool: impl Into<String>) -> Self {
        Self::ToolNotFound(ToolLookup::UnknownTool {
            group: group.into(),
            tool: tool.into(),
        })
    }

    /// Shorthand for a missing required parameter.
    #[must_use]
    pub fn missing_param(name: &str) -> Self {
        Self::InvalidParams(format!("missing required parameter: {name}"))
    }

    /// The protocol error code this failure maps to.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Parse(_) => ErrorCode::ParseError,
            Self::InvalidRequest(_) | Self::NotInitialized { .. } => ErrorCode::InvalidRequest,
            Self::MethodNotFound(_) => ErrorCode::MethodNotFound,
            Self::InvalidParams(_) => ErrorCode::InvalidParams,
            Self::ToolNotFound(_) | Self::Internal(_) => ErrorCode::InternalError,
            Self::StreamCapacity { .. } => ErrorCode::ServerBusy,
            Self::StreamTimeout { .. } => ErrorCode::Timeout,
        }
    }

    /// Whether the display string is safe to show a client in production.
    ///
    /// Client-correctable failures describe the client's own input; internal
    /// failures may describe server state and are replaced by a generic message.
    #[must_use]
    pub const fn is_client_facing(&self) -> bool {
        !matches!(self, Self::ToolNotFound(_) | Self::Internal(_))
    }
}
