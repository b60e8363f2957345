//! kdeploy-core — shared types for upgrading deployed kubeware.
//!
//! Everything in this crate is pure: no cluster access, no async.
//!
//! # Components
//!
//! - **`types`** — releases, controller/service documents, resource refs
//! - **`version`** — the version gate (no downgrades, no blind installs)
//! - **`attributes`** — default/override merging for template rendering
//! - **`source`** — kubeware source URIs and local fetching
//! - **`package`** — `kubeware.toml` metadata and JSON template rendering
//! - **`config`** — control-plane connection settings

pub mod attributes;
pub mod config;
pub mod package;
pub mod source;
pub mod types;
pub mod version;

pub use attributes::{AttributeSet, ResolveError};
pub use config::{ConnectionConfig, KdeployConfig};
pub use package::{GenerateError, Kubeware, KubewareLoader, KubewarePackage, LoadError, LocalLoader, SpecGenerator};
pub use source::{SourceError, SourceUri};
pub use types::*;
pub use version::GateError;
