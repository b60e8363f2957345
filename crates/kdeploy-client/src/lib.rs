//! kdeploy-client — the cluster capability surface used by rollouts.
//!
//! Strategies only ever talk to the cluster through [`ClusterClient`].
//! Two implementations ship here:
//!
//! ```text
//! ClusterClient (trait)
//!   ├── KubeClient     v1 REST API over mutual TLS (hyper + tokio-rustls)
//!   │     └── RestClient   one HTTP/1.1 exchange per call, bounded by a timeout
//!   └── MemoryCluster  in-process cluster with failure injection (tests)
//! ```
//!
//! # Readiness
//!
//! `wait_ready` polls controller status with exponential backoff
//! (initial interval doubling up to a cap) until the requested number of
//! replicas is ready or the deadline passes. Polling never retries a
//! failed status call: errors surface immediately.

pub mod client;
pub mod error;
pub mod kube;
pub mod memory;
pub mod readiness;
pub mod rest;
pub mod tls;

#[cfg(test)]
mod testing;

pub use client::{ClusterClient, ControllerStatus};
pub use error::{ClientError, ClientResult};
pub use kube::KubeClient;
pub use memory::{ClusterEvent, MemoryCluster, Operation};
pub use readiness::{Backoff, ReadyPolicy};
pub use rest::{RestClient, RestResponse};
