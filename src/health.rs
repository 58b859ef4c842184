//! Health aggregation.
//!
//! Component checks are evaluated on demand. The overall status is healthy
//! iff every component reports healthy.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Health status of a single component.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    /// Whether the component is healthy.
    pub is_healthy: bool,
    /// Failure description when unhealthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Extra details about the component.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl ComponentHealth {
    /// A healthy component.
    #[must_use]
    pub const fn healthy() -> Self {
        Self {
            is_healthy: true,
            error: None,
            metadata: BTreeMap::new(),
        }
    }

    /// An unhealthy component.
    #[must_use]
    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            is_healthy: false,
            error: Some(error.into()),
            metadata: BTreeMap::new(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl Default for ComponentHealth {
    fn default() -> Self {
        Self::healthy()
    }
}

/// A named component result inside an [`OverallHealth`] snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedComponentHealth {
    /// Component name.
    pub name: String,
    /// Component result.
    #[serde(flatten)]
    pub health: ComponentHealth,
}

/// Aggregated health snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallHealth {
    /// Whether every component is healthy.
    pub is_healthy: bool,
    /// Component results in registration order.
    pub components: Vec<NamedComponentHealth>,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Server version.
    pub version: String,
}

/// Type alias for health check functions.
pub type HealthCheckFn = Arc<dyn Fn() -> ComponentHealth + Send + Sync>;

/// Composes named component checks into one overall status.
#[derive(Clone)]
pub struct HealthAggregator {
    version: String,
    checks: Vec<(String, HealthCheckFn)>,
}

impl HealthAggregator {
    /// Creates an aggregator reporting `version`.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            checks: Vec::new(),
        }
    }

    /// Registers a component check. A later check with the same name replaces
    /// the earlier one.
    pub fn add_check<F>(&mut self, name: impl Into<String>, check: F)
    where
        F: Fn() -> ComponentHealth + Send + Sync + 'static,
    {
        let name = name.into();
        let check: HealthCheckFn = Arc::new(check);
        if let Some(slot) = self.checks.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = check;
        } else {
            self.checks.push((name, check));
        }
    }

    /// Number of registered checks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Whether no checks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Runs every check and returns the snapshot.
    #[must_use]
    pub fn check(&self) -> OverallHealth {
        let components: Vec<_> = self
            .checks
            .iter()
            .map(|(name, check)| NamedComponentHealth {
                name: name.clone(),
                health: check(),
            })
            .collect();

        OverallHealth {
            is_healthy: components.iter().all(|c| c.health.is_healthy),
            components,
            timestamp: Utc::now(),
            version: self.version.clone(),
        }
    }
}

impl std::fmt::Debug for HealthAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthAggregator")
            .field("version", &self.version)
            .field(
                "checks",
                &self.checks.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
