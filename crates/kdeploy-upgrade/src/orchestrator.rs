//! The upgrade state machine.
//!
//! ```text
//! Start → Fetched → Gated → Resolved → Generated → RollingOut → Succeeded
//!                                                              ↘ Failed(phase, cause)
//! ```
//!
//! One attempt per call. Nothing is retried; running the upgrade again
//! is the recovery path.

use std::fmt;
use std::sync::Arc;

use kdeploy_client::ClusterClient;
use kdeploy_core::attributes;
use kdeploy_core::version;
use kdeploy_core::{KubewareLoader, Release};
use kdeploy_rollout::{Cancellation, UpgradeStrategy};
use tracing::{error, info};

use crate::config::UpgradeConfig;
use crate::error::UpgradeError;

/// States an upgrade attempt moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    Start,
    Fetched,
    Gated,
    Resolved,
    Generated,
    RollingOut,
    Succeeded,
    Failed,
}

impl fmt::Display for UpgradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of a successful upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeReport {
    pub namespace: String,
    pub kubeware: String,
    pub from_version: String,
    pub to_version: String,
    pub strategy: &'static str,
}

impl fmt::Display for UpgradeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} upgraded from {} to {} in namespace {} ({} strategy)",
            self.kubeware, self.from_version, self.to_version, self.namespace, self.strategy
        )
    }
}

/// Sequences one upgrade against a cluster.
pub struct Orchestrator {
    client: Arc<dyn ClusterClient>,
    loader: Arc<dyn KubewareLoader>,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn ClusterClient>, loader: Arc<dyn KubewareLoader>) -> Self {
        Self { client, loader }
    }

    /// Run one upgrade attempt.
    pub async fn upgrade(
        &self,
        config: &UpgradeConfig,
        cancel: &Cancellation,
    ) -> Result<UpgradeReport, UpgradeError> {
        let mut tracker = Tracker::new(&config.namespace);
        let result = self.run(config, cancel, &mut tracker).await;
        match &result {
            Ok(report) => {
                tracker.advance(UpgradeState::Succeeded);
                info!(
                    namespace = %report.namespace,
                    kubeware = %report.kubeware,
                    from = %report.from_version,
                    to = %report.to_version,
                    strategy = report.strategy,
                    "upgrade succeeded"
                );
            }
            Err(e) => {
                tracker.advance(UpgradeState::Failed);
                error!(namespace = %config.namespace, phase = %e.phase(), error = %e, "upgrade failed");
            }
        }
        result
    }

    async fn run(
        &self,
        config: &UpgradeConfig,
        cancel: &Cancellation,
        tracker: &mut Tracker<'_>,
    ) -> Result<UpgradeReport, UpgradeError> {
        let namespace = config.namespace.as_str();

        let package = self.loader.load(&config.kubeware)?;
        let name = package.name().to_string();
        let target = package.version().to_string();
        tracker.advance(UpgradeState::Fetched);
        info!(%namespace, kubeware = %name, version = %target, "kubeware fetched");

        let deployed = self
            .client
            .find_deployed_version(namespace, &name)
            .await
            .map_err(UpgradeError::Discovery)?;
        version::authorize(deployed.as_deref(), &target)?;
        let from_version = deployed.unwrap_or_default();
        tracker.advance(UpgradeState::Gated);
        info!(%namespace, kubeware = %name, from = %from_version, to = %target, "upgrade authorized");

        let attrs = attributes::resolve(&config.attributes, &package.attribute_defaults())?;
        tracker.advance(UpgradeState::Resolved);

        let release = Release {
            name: name.clone(),
            version: target.clone(),
            controllers: package.render_controllers(&attrs)?,
            services: package.render_services(&attrs)?,
        };
        tracker.advance(UpgradeState::Generated);
        info!(
            %namespace,
            controllers = release.controllers.len(),
            services = release.services.len(),
            "release generated"
        );

        let strategy =
            UpgradeStrategy::build(&config.strategy, self.client.clone(), config.rolling.clone())?;
        tracker.advance(UpgradeState::RollingOut);
        info!(%namespace, strategy = strategy.name(), "rolling out");

        strategy.upgrade(namespace, &release, cancel).await?;

        Ok(UpgradeReport {
            namespace: namespace.to_string(),
            kubeware: name,
            from_version,
            to_version: target,
            strategy: strategy.name(),
        })
    }
}

/// Logs every state transition.
struct Tracker<'a> {
    namespace: &'a str,
    state: UpgradeState,
}

impl<'a> Tracker<'a> {
    fn new(namespace: &'a str) -> Self {
        Self {
            namespace,
            state: UpgradeState::Start,
        }
    }

    fn advance(&mut self, next: UpgradeState) {
        info!(namespace = %self.namespace, from = %self.state, to = %next, "upgrade state");
        self.state = next;
    }
}
