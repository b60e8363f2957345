//! Upgrade failures, tagged with the phase they happened in.

use std::fmt;

use kdeploy_client::ClientError;
use kdeploy_core::{GateError, GenerateError, LoadError, ResolveError};
use kdeploy_rollout::{RolloutError, StrategyError};
use thiserror::Error;

/// Where in the upgrade a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Fetch,
    Gate,
    Resolve,
    Generate,
    Strategy,
    Rollout,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Fetch => "fetch",
            Phase::Gate => "gate",
            Phase::Resolve => "resolve",
            Phase::Generate => "generate",
            Phase::Strategy => "strategy",
            Phase::Rollout => "rollout",
        })
    }
}

#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("cannot discover the deployed version: {0}")]
    Discovery(ClientError),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    Rollout(#[from] RolloutError),
}

impl UpgradeError {
    pub fn phase(&self) -> Phase {
        match self {
            UpgradeError::Load(_) => Phase::Fetch,
            UpgradeError::Discovery(_) | UpgradeError::Gate(_) => Phase::Gate,
            UpgradeError::Resolve(_) => Phase::Resolve,
            UpgradeError::Generate(_) => Phase::Generate,
            UpgradeError::Strategy(_) => Phase::Strategy,
            UpgradeError::Rollout(_) => Phase::Rollout,
        }
    }
}
