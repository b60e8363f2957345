//! Strategy registry — maps an identifier to a rollout strategy.

use std::sync::Arc;
use std::time::Duration;

use kdeploy_client::{ClusterClient, ReadyPolicy};
use kdeploy_core::Release;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::Cancellation;
use crate::error::RolloutResult;
use crate::recreate::RecreateAll;
use crate::rolling::RollingReplace;

pub const RECREATE: &str = "recreate";
pub const ROLLING: &str = "rolling";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    #[error("unknown upgrade strategy '{0}' (expected 'recreate' or 'rolling')")]
    UnknownStrategy(String),

    #[error("rolling batch size must be at least 1")]
    InvalidBatchSize,
}

/// Configuration for rolling replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingConfig {
    /// Replicas migrated per step.
    pub batch_size: u32,
    /// Seconds to wait for a step's new replicas to become ready.
    pub ready_timeout_secs: u64,
    /// First readiness poll interval in milliseconds.
    pub poll_initial_ms: u64,
    /// Readiness poll interval cap in milliseconds.
    pub poll_max_ms: u64,
}

impl Default for RollingConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            ready_timeout_secs: 300,
            poll_initial_ms: 1_000,
            poll_max_ms: 15_000,
        }
    }
}

impl RollingConfig {
    pub fn ready_policy(&self) -> ReadyPolicy {
        ReadyPolicy {
            timeout: Duration::from_secs(self.ready_timeout_secs),
            initial_interval: Duration::from_millis(self.poll_initial_ms),
            max_interval: Duration::from_millis(self.poll_max_ms),
        }
    }
}

/// The available rollout strategies.
pub enum UpgradeStrategy {
    RecreateAll(RecreateAll),
    RollingReplace(RollingReplace),
}

impl UpgradeStrategy {
    /// Resolve `id` to a strategy.
    ///
    /// Empty selects recreate. Matching is trimmed and case-insensitive.
    pub fn build(
        id: &str,
        client: Arc<dyn ClusterClient>,
        rolling: RollingConfig,
    ) -> Result<Self, StrategyError> {
        let normalized = id.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "" | RECREATE => Ok(Self::RecreateAll(RecreateAll::new(client))),
            ROLLING => {
                if rolling.batch_size == 0 {
                    return Err(StrategyError::InvalidBatchSize);
                }
                Ok(Self::RollingReplace(RollingReplace::new(client, rolling)))
            }
            _ => Err(StrategyError::UnknownStrategy(id.trim().to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RecreateAll(_) => RECREATE,
            Self::RollingReplace(_) => ROLLING,
        }
    }

    /// Converge `namespace` onto `release`.
    pub async fn upgrade(
        &self,
        namespace: &str,
        release: &Release,
        cancel: &Cancellation,
    ) -> RolloutResult<()> {
        match self {
            Self::RecreateAll(s) => s.upgrade(namespace, release, cancel).await,
            Self::RollingReplace(s) => s.upgrade(namespace, release, cancel).await,
        }
    }
}

impl std::fmt::Debug for UpgradeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
