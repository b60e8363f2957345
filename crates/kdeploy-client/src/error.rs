//! Error types for cluster client calls.

use std::time::Duration;

use kdeploy_core::SpecError;
use thiserror::Error;

/// Result type alias for cluster client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while talking to the control plane.
///
/// `operation` names the request (`POST api/v1/namespaces/web/services`),
/// which carries the namespace and resource involved.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{operation}: unexpected HTTP status {status}")]
    UnexpectedStatus {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("{operation}: resource not found")]
    NotFound { operation: String },

    #[error("{operation}: resource already exists")]
    AlreadyExists { operation: String },

    #[error("{operation}: transport failure: {reason}")]
    Transport { operation: String, reason: String },

    #[error("{operation}: no response within {timeout:?}")]
    RequestTimeout { operation: String, timeout: Duration },

    #[error("controller {controller} not ready after {waited:?} ({ready}/{wanted} replicas ready)")]
    ReadyTimeout {
        controller: String,
        ready: u32,
        wanted: u32,
        waited: Duration,
    },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("invalid API endpoint '{endpoint}': {reason}")]
    Endpoint { endpoint: String, reason: String },

    #[error("{operation}: undecodable response: {source}")]
    Decode {
        operation: String,
        source: serde_json::Error,
    },

    #[error("invalid resource document: {0}")]
    Spec(#[from] SpecError),
}

impl ClientError {
    /// Map a non-success HTTP status to an error.
    pub fn from_status(operation: impl Into<String>, status: u16, body: &[u8]) -> Self {
        let operation = operation.into();
        match status {
            404 => ClientError::NotFound { operation },
            409 => ClientError::AlreadyExists { operation },
            _ => ClientError::UnexpectedStatus {
                operation,
                status,
                body: String::from_utf8_lossy(&body[..body.len().min(512)]).into_owned(),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ClientError::AlreadyExists { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_errors() {
        assert!(ClientError::from_status("GET x", 404, b"").is_not_found());
        assert!(ClientError::from_status("POST x", 409, b"").is_already_exists());
        match ClientError::from_status("POST x", 500, b"boom") {
            ClientError::UnexpectedStatus { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected UnexpectedStatus, got {other:?}"),
        }
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = vec![b'x'; 4096];
        match ClientError::from_status("GET x", 502, &body) {
            ClientError::UnexpectedStatus { body, .. } => assert_eq!(body.len(), 512),
            other => panic!("expected UnexpectedStatus, got {other:?}"),
        }
    }

    #[test]
    fn message_names_the_operation() {
        let err = ClientError::Transport {
            operation: "DELETE api/v1/namespaces/web/services/frontend".into(),
            reason: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "DELETE api/v1/namespaces/web/services/frontend: transport failure: connection refused"
        );
    }
}
