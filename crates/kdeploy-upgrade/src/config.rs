//! Inputs of one upgrade attempt, read once at startup.

use kdeploy_rollout::RollingConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeConfig {
    /// Package identifier: a local directory or `file://` URI.
    pub kubeware: String,
    /// Namespace the kubeware is deployed in.
    pub namespace: String,
    /// Strategy identifier; empty selects recreate.
    #[serde(default)]
    pub strategy: String,
    /// Comma-separated `dotted.key=value` overrides.
    #[serde(default)]
    pub attributes: String,
    #[serde(default)]
    pub rolling: RollingConfig,
}

impl UpgradeConfig {
    pub fn new(kubeware: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            kubeware: kubeware.into(),
            namespace: namespace.into(),
            strategy: String::new(),
            attributes: String::new(),
            rolling: RollingConfig::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = strategy.into();
        self
    }

    pub fn with_attributes(mut self, attributes: impl Into<String>) -> Self {
        self.attributes = attributes.into();
        self
    }

    pub fn with_rolling(mut self, rolling: RollingConfig) -> Self {
        self.rolling = rolling;
        self
    }
}
