//! Readiness polling with exponential backoff.
//!
//! Polls controller status until enough replicas report ready, doubling
//! the poll interval after every miss up to a cap, and gives up at a
//! per-controller deadline.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::client::ClusterClient;
use crate::error::{ClientError, ClientResult};

/// Bounds for a readiness wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyPolicy {
    /// Overall deadline for one wait.
    pub timeout: Duration,
    /// First poll interval.
    pub initial_interval: Duration,
    /// Poll interval cap.
    pub max_interval: Duration,
}

impl Default for ReadyPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(15),
        }
    }
}

/// Exponential backoff: `base`, `2*base`, `4*base`, ... capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            current: base,
            max: max.max(base),
        }
    }

    /// Interval to wait now; doubles the next one.
    pub fn next_interval(&mut self) -> Duration {
        let interval = self.current;
        self.current = (self.current * 2).min(self.max);
        interval
    }
}

/// Poll `controller` until `wanted` replicas are ready.
pub async fn wait_ready<C: ClusterClient + ?Sized>(
    client: &C,
    namespace: &str,
    controller: &str,
    wanted: u32,
    policy: &ReadyPolicy,
) -> ClientResult<()> {
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut backoff = Backoff::new(policy.initial_interval, policy.max_interval);

    loop {
        let status = client.controller_status(namespace, controller).await?;
        if status.ready_replicas >= wanted {
            debug!(
                %namespace,
                %controller,
                ready = status.ready_replicas,
                wanted,
                elapsed = ?started.elapsed(),
                "controller ready"
            );
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(ClientError::ReadyTimeout {
                controller: controller.to_string(),
                ready: status.ready_replicas,
                wanted,
                waited: now - started,
            });
        }

        let interval = backoff.next_interval().min(deadline - now);
        debug!(
            %namespace,
            %controller,
            ready = status.ready_replicas,
            wanted,
            next_poll = ?interval,
            "waiting for controller readiness"
        );
        tokio::time::sleep(interval).await;
    }
}
