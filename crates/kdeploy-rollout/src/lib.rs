//! kdeploy rollout strategies — move a namespace from one kubeware
//! release to the next.
//!
//! # Components
//!
//! - **`strategy`** — `RollingConfig`, the strategy registry and the
//!   closed `UpgradeStrategy` enum
//! - **`recreate`** — tear everything down, then create the release
//! - **`rolling`** — migrate each controller batch by batch behind a
//!   readiness gate, then repoint services
//! - **`cancel`** — cooperative cancellation checked between batches
//! - **`error`** — partial-progress error taxonomy
//!
//! Strategies never roll back. A failure stops forward progress and the
//! error describes how far the rollout got; re-running the upgrade picks
//! up from the cluster's current state.

pub mod cancel;
pub mod error;
pub mod recreate;
pub mod rolling;
pub mod strategy;

#[cfg(test)]
mod testing;

pub use cancel::Cancellation;
pub use error::{RolloutError, RolloutResult};
pub use recreate::RecreateAll;
pub use rolling::RollingReplace;
pub use strategy::{RollingConfig, StrategyError, UpgradeStrategy};
