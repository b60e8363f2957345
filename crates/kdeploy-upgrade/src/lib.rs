//! kdeploy-upgrade — one upgrade attempt, start to finish.
//!
//! # Architecture
//!
//! ```text
//! UpgradeConfig ──▶ Orchestrator
//!                     │ fetch     KubewareLoader      → package (name, version, defaults)
//!                     │ gate      ClusterClient       → deployed version, authorize
//!                     │ resolve   attributes::resolve → AttributeSet
//!                     │ generate  SpecGenerator       → Release
//!                     │ strategy  UpgradeStrategy::build
//!                     ▼ rollout   UpgradeStrategy::upgrade
//!                   UpgradeReport | UpgradeError (phase + cause)
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;

pub use config::UpgradeConfig;
pub use error::{Phase, UpgradeError};
pub use orchestrator::{Orchestrator, UpgradeReport, UpgradeState};
