//! Rollout errors. Every variant says how far the rollout got.

use std::time::Duration;

use kdeploy_client::ClientError;
use kdeploy_core::ResourceRef;
use thiserror::Error;

pub type RolloutResult<T> = Result<T, RolloutError>;

#[derive(Debug, Error)]
pub enum RolloutError {
    /// Some deployed resources could not be deleted. Every deletion was
    /// attempted.
    #[error("teardown incomplete, could not delete {}", describe_failures(.failed))]
    PartialTeardown {
        failed: Vec<(ResourceRef, ClientError)>,
    },

    /// Creation stopped at the first failure.
    #[error(
        "rollout incomplete ({} created, {} pending: {}): {cause}",
        .created.len(),
        .pending.len(),
        join(.pending)
    )]
    PartialRollout {
        created: Vec<ResourceRef>,
        pending: Vec<ResourceRef>,
        cause: ClientError,
    },

    #[error(
        "controller {controller} not ready after {waited:?}, {replicas_migrated} replica(s) migrated"
    )]
    RolloutTimeout {
        controller: String,
        replicas_migrated: u32,
        waited: Duration,
    },

    #[error("migration of controller {controller} stalled after {replicas_migrated} replica(s): {cause}")]
    RolloutStalled {
        controller: String,
        replicas_migrated: u32,
        cause: ClientError,
    },

    #[error("rollout cancelled")]
    Cancelled,

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("rollout task failed: {0}")]
    TaskFailed(String),
}

fn join(resources: &[ResourceRef]) -> String {
    resources
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_failures(failed: &[(ResourceRef, ClientError)]) -> String {
    failed
        .iter()
        .map(|(resource, err)| format!("{resource} ({err})"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_rollout_lists_pending() {
        let err = RolloutError::PartialRollout {
            created: vec![ResourceRef::controller("frontend")],
            pending: vec![ResourceRef::service("frontend"), ResourceRef::service("redis")],
            cause: ClientError::NotFound {
                operation: "POST api/v1/namespaces/web/services".into(),
            },
        };
        let msg = err.to_string();
        assert!(msg.starts_with("rollout incomplete (1 created, 2 pending: service/frontend, service/redis)"));
        assert!(msg.ends_with("resource not found"));
    }

    #[test]
    fn partial_teardown_names_each_failure() {
        let err = RolloutError::PartialTeardown {
            failed: vec![(
                ResourceRef::controller("redis"),
                ClientError::Transport {
                    operation: "DELETE x".into(),
                    reason: "reset".into(),
                },
            )],
        };
        assert_eq!(
            err.to_string(),
            "teardown incomplete, could not delete controller/redis (DELETE x: transport failure: reset)"
        );
    }
}
