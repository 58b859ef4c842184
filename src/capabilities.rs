//! Capability registry.
//!
//! The set of optional protocol features is fixed at startup and never
//! changes afterwards, so lookups need no locking and never block.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A named optional protocol feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    /// Tool listing and invocation.
    Tools,
    /// Resource listing and reading.
    Resources,
    /// Prompt templates.
    Prompts,
    /// Server-initiated sampling requests.
    Sampling,
    /// Log message notifications.
    Logging,
}

impl Feature {
    /// All features, in advertisement order.
    pub const ALL: [Self; 5] = [
        Self::Tools,
        Self::Resources,
        Self::Prompts,
        Self::Sampling,
        Self::Logging,
    ];

    /// Wire name of the feature.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tools => "tools",
            Self::Resources => "resources",
            Self::Prompts => "prompts",
            Self::Sampling => "sampling",
            Self::Logging => "logging",
        }
    }

    const fn flag(self) -> FeatureSet {
        match self {
            Self::Tools => FeatureSet::TOOLS,
            Self::Resources => FeatureSet::RESOURCES,
            Self::Prompts => FeatureSet::PROMPTS,
            Self::Sampling => FeatureSet::SAMPLING,
            Self::Logging => FeatureSet::LOGGING,
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// Bit set of enabled features.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FeatureSet: u8 {
        /// [`Feature::Tools`]
        const TOOLS = 1;
        /// [`Feature::Resources`]
        const RESOURCES = 1 << 1;
        /// [`Feature::Prompts`]
        const PROMPTS = 1 << 2;
        /// [`Feature::Sampling`]
        const SAMPLING = 1 << 3;
        /// [`Feature::Logging`]
        const LOGGING = 1 << 4;
    }
}

impl FromIterator<Feature> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |set, feature| set | feature.flag())
    }
}

/// Immutable table of supported features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityRegistry {
    supported: FeatureSet,
}

impl CapabilityRegistry {
    /// Creates a registry from an explicit feature set.
    #[must_use]
    pub const fn new(supported: FeatureSet) -> Self {
        Self { supported }
    }

    /// Creates a registry from a list of features.
    #[must_use]
    pub fn from_features(features: &[Feature]) -> Self {
        Self::new(features.iter().copied().collect())
    }

    /// Whether `feature` is supported.
    #[must_use]
    pub fn is_feature_supported(&self, feature: Feature) -> bool {
        self.supported.contains(feature.flag())
    }

    /// Whether tools are supported.
    #[must_use]
    pub fn supports_tools(&self) -> bool {
        self.is_feature_supported(Feature::Tools)
    }

    /// Whether resources are supported.
    #[must_use]
    pub fn supports_resources(&self) -> bool {
        self.is_feature_supported(Feature::Resources)
    }

    /// Whether prompts are supported.
    #[must_use]
    pub fn supports_prompts(&self) -> bool {
        self.is_feature_supported(Feature::Prompts)
    }

    /// Whether sampling is supported.
    #[must_use]
    pub fn supports_sampling(&self) -> bool {
        self.is_feature_supported(Feature::Sampling)
    }

    /// Whether logging is supported.
    #[must_use]
    pub fn supports_logging(&self) -> bool {
        self.is_feature_supported(Feature::Logging)
    }

    /// Supported features, in advertisement order.
    #[must_use]
    pub fn features(&self) -> Vec<Feature> {
        Feature::ALL
            .into_iter()
            .filter(|f| self.is_feature_supported(*f))
            .collect()
    }

    /// The `capabilities` object sent in the initialize response.
    ///
    /// Each supported feature appears as a key; unsupported ones are omitted.
    #[must_use]
    pub fn advertisement(&self) -> Value {
        let mut caps = Map::new();
        for feature in self.features() {
            let entry = match feature {
                Feature::Tools | Feature::Prompts => json!({ "listChanged": false }),
                Feature::Resources => json!({ "subscribe": false, "listChanged": false }),
                Feature::Sampling | Feature::Logging => json!({}),
            };
            caps.insert(feature.as_str().to_string(), entry);
        }
        Value::Object(caps)
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::from_features(&[Feature::Tools, Feature::Logging])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_supports_tools_and_logging() {
        let caps = CapabilityRegistry::default();
        assert!(caps.supports_tools());
        assert!(caps.supports_logging());
        assert!(!caps.supports_resources());
        assert!(!caps.supports_prompts());
        assert!(!caps.supports_sampling());
    }

    #[test]
    fn empty_registry_supports_nothing() {
        let caps = CapabilityRegistry::new(FeatureSet::empty());
        for feature in Feature::ALL {
            assert!(!caps.is_feature_supported(feature));
        }
        assert_eq!(caps.advertisement(), json!({}));
    }

    #[test]
    fn advertisement_lists_only_supported() {
        let caps = CapabilityRegistry::from_features(&[Feature::Tools, Feature::Resources]);
        let adv = caps.advertisement();
        assert_eq!(adv["tools"], json!({ "listChanged": false }));
        assert!(adv.get("resources").is_some());
        assert!(adv.get("logging").is_none());
    }

    #[test]
    fn features_keep_advertisement_order() {
        let caps = CapabilityRegistry::from_features(&[Feature::Logging, Feature::Tools]);
        assert_eq!(caps.features(), vec![Feature::Tools, Feature::Logging]);
    }

    #[test]
    fn feature_deserialises_lowercase() {
        let features: Vec<Feature> = serde_json::from_str(r#"["tools", "sampling"]"#).unwrap();
        assert_eq!(features, vec![Feature::Tools, Feature::Sampling]);
        assert!(serde_json::from_str::<Feature>(r#""Tools""#).is_err());
    }
}
