//! Tool group registry.
//!
//! Built once at startup through [`ToolGroupRegistryBuilder`] and read-only
//! afterwards, so lookups from concurrent sessions need no locking.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{McpError, RegistryError};
use crate::tools::descriptor::{split_tool_name, ToolDefinition};
use crate::tools::group::{ChunkStream, ToolCallResult, ToolGroup};
use crate::tools::params::ToolParams;

/// Registers tool groups and hands each its configuration.
#[derive(Default)]
pub struct ToolGroupRegistryBuilder {
    configs: HashMap<String, Value>,
    groups: Vec<Arc<dyn ToolGroup>>,
}

impl ToolGroupRegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Supplies per-group configuration blobs, keyed by group name.
    #[must_use]
    pub fn with_configs(mut self, configs: HashMap<String, Value>) -> Self {
        self.configs = configs;
        self
    }

    /// Validates, configures and stores a group.
    ///
    /// The group's configuration hook runs here, exactly once.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid metadata, a duplicate group name, or a
    /// configuration the group rejects.
    pub fn register<G>(mut self, mut group: G) -> Result<Self, RegistryError>
    where
        G: ToolGroup + 'static,
    {
        group.metadata().validate()?;

        let name = group.name().to_string();
        if self.groups.iter().any(|g| g.name() == name) {
            return Err(RegistryError::DuplicateGroup { group: name });
        }

        let config = self.configs.remove(&name);
        group
            .configure(config.as_ref())
            .map_err(|message| RegistryError::Configuration {
                group: name.clone(),
                message,
            })?;

        debug!(
            group = %name,
            tools = group.metadata().tools.len(),
            configured = config.is_some(),
            "Registered tool group"
        );
        self.groups.push(Arc::new(group));
        Ok(self)
    }

    /// Finishes registration.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration was supplied for a group that was
    /// never registered.
    pub fn build(self) -> Result<ToolGroupRegistry, RegistryError> {
        if let Some(group) = self.configs.keys().min() {
            return Err(RegistryError::UnknownGroupConfig {
                group: group.clone(),
            });
        }

        let index = self
            .groups
            .iter()
            .enumerate()
            .map(|(i, g)| (g.name().to_string(), i))
            .collect();

        Ok(ToolGroupRegistry {
            groups: self.groups,
            index,
        })
    }
}

/// Read-only index of tool groups by name.
#[derive(Default)]
pub struct ToolGroupRegistry {
    groups: Vec<Arc<dyn ToolGroup>>,
    index: HashMap<String, usize>,
}

impl ToolGroupRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> ToolGroupRegistryBuilder {
        ToolGroupRegistryBuilder::new()
    }

    /// Number of registered groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether no groups are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Group names in registration order.
    #[must_use]
    pub fn group_names(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name()).collect()
    }

    /// Looks up a group by name.
    #[must_use]
    pub fn get(&self, group: &str) -> Option<&Arc<dyn ToolGroup>> {
        self.index.get(group).and_then(|&i| self.groups.get(i))
    }

    /// The advertised tool catalog, grouped in registration order.
    #[must_use]
    pub fn catalog(&self) -> Vec<ToolDefinition> {
        self.groups
            .iter()
            .flat_map(|g| g.metadata().definitions())
            .collect()
    }

    /// Resolves `<group>.<tool>` to the owning group and the local tool name.
    ///
    /// Only the group is checked here; the group itself decides whether it
    /// knows the tool.
    ///
    /// # Errors
    ///
    /// Returns `ToolNotFound` (unknown group) if the name has no separator or
    /// the group is not registered.
    pub fn resolve<'n>(&self, name: &'n str) -> Result<(Arc<dyn ToolGroup>, &'n str), McpError> {
        let Some((group, tool)) = split_tool_name(name) else {
            return Err(McpError::unknown_group(name));
        };
        let group = self
            .get(group)
            .ok_or_else(|| McpError::unknown_group(group))?;
        Ok((Arc::clone(group), tool))
    }

    /// Invokes a tool by its advertised name.
    ///
    /// # Errors
    ///
    /// Returns `ToolNotFound` for an unknown group or tool, and whatever the
    /// tool itself raises.
    pub async fn invoke(&self, name: &str, params: ToolParams) -> Result<ToolCallResult, McpError> {
        let (group, tool) = self.resolve(name)?;
        debug!(group = %group.name(), tool = %tool, "Invoking tool");
        group.invoke(tool, params).await
    }

    /// Opens a streaming invocation by advertised name.
    ///
    /// # Errors
    ///
    /// Same as [`invoke`](Self::invoke).
    pub async fn invoke_stream(
        &self,
        name: &str,
        params: ToolParams,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, McpError> {
        let (group, tool) = self.resolve(name)?;
        debug!(group = %group.name(), tool = %tool, "Opening tool stream");
        group.invoke_stream(tool, params, cancel).await
    }
}

impl std::fmt::Debug for ToolGroupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolGroupRegistry")
            .field("groups", &self.group_names())
            .finish()
    }
}
