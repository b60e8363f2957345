//! RollingReplace — migrate controllers batch by batch behind a
//! readiness gate.
//!
//! # Algorithm
//!
//! ```text
//! for each controller (one task each):
//!     new = <name>-<version-slug>
//!     for each deployed controller of the same component:
//!         while old > 0:
//!             grow new by batch (≤ desired), wait until ready
//!             shrink old by batch
//!         delete old
//!     grow new to desired
//! barrier
//! repoint or create every service (concurrently)
//! delete deployed resources absent from the release
//! ```
//!
//! The new controller always grows before the old one shrinks, so
//! serving capacity never drops below what was running before the
//! upgrade (as long as the new release does not ask for fewer replicas).
//! Service selectors never name a version, so a service keeps routing to
//! the draining and the growing controller alike.
//! Nothing is rolled back on failure. A re-run finds the version-suffixed
//! controller and resumes from its replica count.

use std::collections::HashSet;
use std::sync::Arc;

use kdeploy_client::{ClientError, ClientResult, ClusterClient, ReadyPolicy};
use kdeploy_core::{ControllerSpec, DeployedResource, Release, ResourceKind, ResourceRef, ServiceSpec};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cancel::Cancellation;
use crate::error::{RolloutError, RolloutResult};
use crate::strategy::RollingConfig;

pub struct RollingReplace {
    client: Arc<dyn ClusterClient>,
    config: RollingConfig,
}

impl RollingReplace {
    pub fn new(client: Arc<dyn ClusterClient>, config: RollingConfig) -> Self {
        Self { client, config }
    }

    pub async fn upgrade(
        &self,
        namespace: &str,
        release: &Release,
        cancel: &Cancellation,
    ) -> RolloutResult<()> {
        cancel.check()?;
        let deployed = self
            .client
            .query_by_labels(namespace, &release.selector())
            .await?;

        let (migrations, claimed) = self.plan(namespace, release, &deployed);
        info!(
            %namespace,
            kubeware = %release.name,
            version = %release.version,
            controllers = migrations.len(),
            batch_size = self.config.batch_size,
            "starting rolling replace"
        );

        self.migrate_all(migrations, cancel).await?;
        self.reconcile_services(namespace, release, &deployed, cancel)
            .await?;
        self.delete_orphans(namespace, release, &deployed, &claimed)
            .await?;

        info!(%namespace, kubeware = %release.name, version = %release.version, "rolling replace complete");
        Ok(())
    }

    /// Pair every controller of the release with the deployed controllers
    /// it replaces. Returns the migrations and every deployed controller
    /// name they account for.
    fn plan(
        &self,
        namespace: &str,
        release: &Release,
        deployed: &[DeployedResource],
    ) -> (Vec<Migration>, HashSet<String>) {
        let mut claimed = HashSet::new();
        let mut migrations = Vec::with_capacity(release.controllers.len());

        for spec in &release.controllers {
            let target = spec.versioned(&release.version);
            let mut resume = false;
            let mut olds = Vec::new();

            for resource in deployed.iter().filter(|r| r.kind() == ResourceKind::Controller) {
                if claimed.contains(resource.name()) {
                    continue;
                }
                if resource.name() == target.name() {
                    resume = true;
                } else if resource.name() == spec.name() || resource.component() == spec.name() {
                    olds.push(resource.name().to_string());
                } else {
                    continue;
                }
                claimed.insert(resource.name().to_string());
            }

            debug!(
                %namespace,
                controller = spec.name(),
                target = target.name(),
                ?olds,
                resume,
                "planned migration"
            );
            migrations.push(Migration {
                client: self.client.clone(),
                namespace: namespace.to_string(),
                component: spec.name().to_string(),
                target,
                olds,
                created: resume,
                migrated: 0,
                batch_size: self.config.batch_size,
                policy: self.config.ready_policy(),
            });
        }

        (migrations, claimed)
    }

    /// Run every migration on its own task and wait for all of them.
    ///
    /// The first failure stops the siblings at their next batch boundary.
    async fn migrate_all(&self, migrations: Vec<Migration>, cancel: &Cancellation) -> RolloutResult<()> {
        let (abort_tx, abort_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();
        for migration in migrations {
            tasks.spawn(migration.run(cancel.with(abort_rx.clone())));
        }

        let mut first: Option<RolloutError> = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|e| Err(RolloutError::TaskFailed(e.to_string())));
            let Err(err) = outcome else {
                continue;
            };
            abort_tx.send_replace(true);
            let replace = match &first {
                None => true,
                Some(RolloutError::Cancelled) => !matches!(err, RolloutError::Cancelled),
                Some(_) => false,
            };
            if replace {
                first = Some(err);
            }
        }

        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Apply every service's selector; create missing services.
    async fn reconcile_services(
        &self,
        namespace: &str,
        release: &Release,
        deployed: &[DeployedResource],
        cancel: &Cancellation,
    ) -> RolloutResult<()> {
        cancel.check()?;
        let existing: HashSet<&str> = deployed
            .iter()
            .filter(|r| r.kind() == ResourceKind::Service)
            .map(DeployedResource::name)
            .collect();

        let mut tasks = JoinSet::new();
        for (index, spec) in release.services.iter().enumerate() {
            let client = self.client.clone();
            let namespace = namespace.to_string();
            let target = spec.versioned(&release.version);
            let exists = existing.contains(spec.name());
            tasks.spawn(async move {
                let result = reconcile_service(client.as_ref(), &namespace, &target, exists).await;
                (index, result)
            });
        }

        let mut outcomes: Vec<Option<ClientResult<()>>> =
            release.services.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined.map_err(|e| RolloutError::TaskFailed(e.to_string()))?;
            outcomes[index] = Some(result);
        }

        let mut created: Vec<ResourceRef> = release
            .controllers
            .iter()
            .map(|c| ResourceRef::controller(c.versioned(&release.version).name()))
            .collect();
        let mut pending = Vec::new();
        let mut cause = None;
        for (spec, outcome) in release.services.iter().zip(outcomes) {
            match outcome {
                Some(Ok(())) => created.push(ResourceRef::service(spec.name())),
                Some(Err(e)) => {
                    warn!(%namespace, service = spec.name(), error = %e, "service update failed");
                    pending.push(ResourceRef::service(spec.name()));
                    cause.get_or_insert(e);
                }
                None => pending.push(ResourceRef::service(spec.name())),
            }
        }

        match cause {
            Some(cause) => Err(RolloutError::PartialRollout {
                created,
                pending,
                cause,
            }),
            None => Ok(()),
        }
    }

    /// Delete labeled resources the release no longer contains.
    async fn delete_orphans(
        &self,
        namespace: &str,
        release: &Release,
        deployed: &[DeployedResource],
        claimed: &HashSet<String>,
    ) -> RolloutResult<()> {
        let services: HashSet<&str> = release.services.iter().map(ServiceSpec::name).collect();
        let orphans = deployed.iter().filter(|r| match r.kind() {
            ResourceKind::Controller => !claimed.contains(r.name()),
            ResourceKind::Service => !services.contains(r.name()),
        });

        let mut failed = Vec::new();
        for orphan in orphans {
            match self.client.delete_resource(namespace, &orphan.reference).await {
                Ok(()) => info!(%namespace, resource = %orphan.reference, "removed resource dropped from release"),
                Err(e) if e.is_not_found() => {}
                Err(e) => failed.push((orphan.reference.clone(), e)),
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(RolloutError::PartialTeardown { failed })
        }
    }
}

async fn reconcile_service(
    client: &dyn ClusterClient,
    namespace: &str,
    target: &ServiceSpec,
    exists: bool,
) -> ClientResult<()> {
    if exists {
        match client
            .patch_service_selector(namespace, target.name(), &target.selector())
            .await
        {
            Err(e) if e.is_not_found() => client.create_service(namespace, target).await,
            other => other,
        }
    } else {
        match client.create_service(namespace, target).await {
            Err(e) if e.is_already_exists() => {
                client
                    .patch_service_selector(namespace, target.name(), &target.selector())
                    .await
            }
            other => other,
        }
    }
}

/// One controller's move from its deployed predecessors to `target`.
struct Migration {
    client: Arc<dyn ClusterClient>,
    namespace: String,
    component: String,
    target: ControllerSpec,
    olds: Vec<String>,
    /// Whether the target controller exists.
    created: bool,
    /// Target replicas confirmed ready.
    migrated: u32,
    batch_size: u32,
    policy: ReadyPolicy,
}

impl Migration {
    async fn run(mut self, cancel: Cancellation) -> RolloutResult<()> {
        let desired = self.target.replicas();

        if self.created {
            let current = self.status(self.target.name()).await?.replicas;
            info!(
                namespace = %self.namespace,
                controller = %self.component,
                target = self.target.name(),
                replicas = current,
                "resuming migration"
            );
            if current > 0 {
                self.wait_ready(current).await?;
            }
        }

        for old in std::mem::take(&mut self.olds) {
            let mut remaining = match self.client.controller_status(&self.namespace, &old).await {
                Ok(status) => status.replicas,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(self.stalled(e)),
            };

            while remaining > 0 {
                cancel.check()?;
                if self.migrated < desired {
                    let next = (self.migrated + self.batch_size).min(desired);
                    self.grow(next).await?;
                }
                remaining = remaining.saturating_sub(self.batch_size);
                self.client
                    .scale_controller(&self.namespace, &old, remaining)
                    .await
                    .map_err(|e| self.stalled(e))?;
                info!(
                    namespace = %self.namespace,
                    controller = %self.component,
                    from = %old,
                    to = self.target.name(),
                    old_replicas = remaining,
                    new_replicas = self.migrated,
                    "batch migrated"
                );
            }

            cancel.check()?;
            match self
                .client
                .delete_resource(&self.namespace, &ResourceRef::controller(&old))
                .await
            {
                Ok(()) | Err(ClientError::NotFound { .. }) => {}
                Err(e) => return Err(self.stalled(e)),
            }
            info!(namespace = %self.namespace, controller = %self.component, removed = %old, "old controller removed");
        }

        if !self.created || self.migrated != desired {
            cancel.check()?;
            self.grow(desired).await?;
        }
        Ok(())
    }

    /// Size the target controller at `replicas`, creating it if needed,
    /// and wait for readiness.
    async fn grow(&mut self, replicas: u32) -> RolloutResult<()> {
        let name = self.target.name().to_string();
        let result = if self.created {
            self.client
                .scale_controller(&self.namespace, &name, replicas)
                .await
        } else {
            match self
                .client
                .create_controller(&self.namespace, &self.target.with_replicas(replicas))
                .await
            {
                Err(e) if e.is_already_exists() => {
                    self.client
                        .scale_controller(&self.namespace, &name, replicas)
                        .await
                }
                other => other,
            }
        };
        result.map_err(|e| self.stalled(e))?;
        self.created = true;

        self.wait_ready(replicas).await
    }

    async fn wait_ready(&mut self, replicas: u32) -> RolloutResult<()> {
        let name = self.target.name().to_string();
        let result = self
            .client
            .wait_ready(&self.namespace, &name, replicas, &self.policy)
            .await;
        match result {
            Ok(()) => {
                self.migrated = replicas;
                Ok(())
            }
            Err(ClientError::ReadyTimeout { ready, waited, .. }) => Err(RolloutError::RolloutTimeout {
                controller: self.component.clone(),
                replicas_migrated: ready,
                waited,
            }),
            Err(e) => Err(self.stalled(e)),
        }
    }

    async fn status(&self, controller: &str) -> RolloutResult<kdeploy_client::ControllerStatus> {
        self.client
            .controller_status(&self.namespace, controller)
            .await
            .map_err(|e| self.stalled(e))
    }

    fn stalled(&self, cause: ClientError) -> RolloutError {
        RolloutError::RolloutStalled {
            controller: self.component.clone(),
            replicas_migrated: self.migrated,
            cause,
        }
    }
}
