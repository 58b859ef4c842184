//! Built-in tool groups.
//!
//! - `echo`: returns messages, or streams them word by word
//! - `math`: arithmetic, including a streaming series sum

mod echo;
mod math;

pub use echo::EchoGroup;
pub use math::MathGroup;

use std::collections::HashMap;

use serde_json::Value;

use crate::error::RegistryError;
use crate::tools::ToolGroupRegistry;

/// Builds a registry holding every built-in group, each configured from
/// `configs` by group name.
///
/// # Errors
///
/// Returns an error if a group rejects its configuration or `configs` names
/// a group that does not exist.
pub fn builtin_registry(configs: HashMap<String, Value>) -> Result<ToolGroupRegistry, RegistryError> {
    ToolGroupRegistry::builder()
        .with_configs(configs)
        .register(EchoGroup::new())?
        .register(MathGroup::new())?
        .build()
}
