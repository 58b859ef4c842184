//! Static tool metadata and the advertised tool catalog.
//!
//! Each advertised tool is named `<group>.<tool>` and carries an input schema
//! derived mechanically from its parameter descriptors. The schema is
//! advisory: invocations are not validated against it before dispatch.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Separator between group and tool in an advertised tool name.
pub const GROUP_SEPARATOR: char = '.';

/// Declared type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    /// JSON string.
    String,
    /// JSON number.
    Number,
    /// JSON boolean.
    Boolean,
    /// JSON object.
    Object,
    /// JSON array.
    Array,
}

/// One parameter of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolParameterDescriptor {
    /// Parameter name, unique within its tool.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Whether callers must supply it.
    #[serde(default)]
    pub required: bool,
}

/// Static description of one tool within a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Local tool name, unique within its group.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Parameters in declaration order.
    #[serde(default)]
    pub parameters: Vec<ToolParameterDescriptor>,
}

impl ToolDescriptor {
    /// Creates a tool with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Appends a required parameter.
    #[must_use]
    pub fn required(self, name: &str, param_type: ParameterType, description: &str) -> Self {
        self.param(name, param_type, description, true)
    }

    /// Appends an optional parameter.
    #[must_use]
    pub fn optional(self, name: &str, param_type: ParameterType, description: &str) -> Self {
        self.param(name, param_type, description, false)
    }

    fn param(
        mut self,
        name: &str,
        param_type: ParameterType,
        description: &str,
        required: bool,
    ) -> Self {
        self.parameters.push(ToolParameterDescriptor {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required,
        });
        self
    }

    /// Derives the JSON input schema.
    ///
    /// One property per parameter in declaration order; `required` lists the
    /// required parameters in the same order.
    #[must_use]
    pub fn input_schema(&self) -> InputSchema {
        let properties = self
            .parameters
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    PropertySchema {
                        property_type: p.param_type,
                        description: p.description.clone(),
                    },
                )
            })
            .collect();

        let required = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.clone())
            .collect();

        InputSchema {
            schema_type: "object",
            properties,
            required,
        }
    }
}

/// Metadata of a tool group: its name and its tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolGroupMetadata {
    /// Group name, unique across the registry.
    pub name: String,
    /// Tools owned by the group.
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}

impl ToolGroupMetadata {
    /// Creates metadata for a group.
    #[must_use]
    pub fn new(name: impl Into<String>, tools: Vec<ToolDescriptor>) -> Self {
        Self {
            name: name.into(),
            tools,
        }
    }

    /// Looks up a tool by local name.
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Checks naming rules and uniqueness of tool names.
    ///
    /// # Errors
    ///
    /// Returns an error if the group or a tool has an invalid name, or two
    /// tools share a name.
    pub fn validate(&self) -> Result<(), RegistryError> {
        validate_name(&self.name)?;

        let mut seen = std::collections::HashSet::new();
        for tool in &self.tools {
            validate_name(&tool.name)?;
            if !seen.insert(tool.name.as_str()) {
                return Err(RegistryError::DuplicateTool {
                    group: self.name.clone(),
                    tool: tool.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Advertised definitions for every tool in the group.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| ToolDefinition {
                name: qualified_name(&self.name, &tool.name),
                description: tool.description.clone(),
                input_schema: tool.input_schema(),
            })
            .collect()
    }
}

fn validate_name(name: &str) -> Result<(), RegistryError> {
    let reason = if name.is_empty() {
        "name cannot be empty"
    } else if name.contains(GROUP_SEPARATOR) {
        "name cannot contain the group separator '.'"
    } else if name.chars().any(char::is_whitespace) {
        "name cannot contain whitespace"
    } else {
        return Ok(());
    };

    Err(RegistryError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

/// Joins a group and a local tool name.
#[must_use]
pub fn qualified_name(group: &str, tool: &str) -> String {
    format!("{group}{GROUP_SEPARATOR}{tool}")
}

/// Splits an advertised tool name into `(group, tool)`.
///
/// Returns `None` when the separator is missing or either half is empty.
#[must_use]
pub fn split_tool_name(name: &str) -> Option<(&str, &str)> {
    let (group, tool) = name.split_once(GROUP_SEPARATOR)?;
    if group.is_empty() || tool.is_empty() {
        return None;
    }
    Some((group, tool))
}

/// JSON schema of one parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertySchema {
    /// Declared type.
    #[serde(rename = "type")]
    pub property_type: ParameterType,
    /// Human-readable description.
    pub description: String,
}

/// JSON schema of a tool's input object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputSchema {
    /// Always `"object"`.
    #[serde(rename = "type")]
    pub schema_type: &'static str,
    /// Properties in parameter declaration order.
    pub properties: IndexMap<String, PropertySchema>,
    /// Required parameter names in declaration order.
    pub required: Vec<String>,
}

/// A tool definition as advertised to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Qualified `<group>.<tool>` name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: InputSchema,
}
