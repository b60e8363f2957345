//! RecreateAll — delete everything, then create the release.
//!
//! The kubeware is unavailable between teardown and creation.

use std::sync::Arc;

use kdeploy_client::{ClientResult, ClusterClient};
use kdeploy_core::{ControllerSpec, DeployedResource, Release, ResourceKind, ResourceRef, ServiceSpec};
use tracing::{debug, info, warn};

use crate::cancel::Cancellation;
use crate::error::{RolloutError, RolloutResult};

pub struct RecreateAll {
    client: Arc<dyn ClusterClient>,
}

impl RecreateAll {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    pub async fn upgrade(
        &self,
        namespace: &str,
        release: &Release,
        cancel: &Cancellation,
    ) -> RolloutResult<()> {
        cancel.check()?;
        warn!(
            %namespace,
            kubeware = %release.name,
            "recreate strategy: kubeware is unavailable until the new release is created"
        );

        let deployed = self
            .client
            .query_by_labels(namespace, &release.selector())
            .await?;
        self.teardown(namespace, &deployed).await?;

        cancel.check()?;
        self.create_all(namespace, release).await
    }

    /// Delete controllers, then services. Attempts every deletion.
    async fn teardown(&self, namespace: &str, deployed: &[DeployedResource]) -> RolloutResult<()> {
        let ordered = deployed
            .iter()
            .filter(|r| r.kind() == ResourceKind::Controller)
            .chain(deployed.iter().filter(|r| r.kind() == ResourceKind::Service));

        let mut failed = Vec::new();
        for resource in ordered {
            match self.client.delete_resource(namespace, &resource.reference).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!(%namespace, resource = %resource.reference, "already deleted");
                }
                Err(e) => {
                    warn!(%namespace, resource = %resource.reference, error = %e, "delete failed");
                    failed.push((resource.reference.clone(), e));
                }
            }
        }

        if failed.is_empty() {
            info!(%namespace, deleted = deployed.len(), "teardown complete");
            Ok(())
        } else {
            Err(RolloutError::PartialTeardown { failed })
        }
    }

    /// Create controllers, then services, stopping at the first failure.
    async fn create_all(&self, namespace: &str, release: &Release) -> RolloutResult<()> {
        let plan: Vec<Planned<'_>> = release
            .controllers
            .iter()
            .map(Planned::Controller)
            .chain(release.services.iter().map(Planned::Service))
            .collect();

        let mut created = Vec::with_capacity(plan.len());
        for (index, item) in plan.iter().enumerate() {
            match item.create(self.client.as_ref(), namespace).await {
                Ok(()) => created.push(item.reference()),
                Err(e) if e.is_already_exists() => {
                    debug!(%namespace, resource = %item.reference(), "already exists");
                    created.push(item.reference());
                }
                Err(cause) => {
                    let pending = plan[index..].iter().map(Planned::reference).collect();
                    return Err(RolloutError::PartialRollout {
                        created,
                        pending,
                        cause,
                    });
                }
            }
        }

        info!(
            %namespace,
            kubeware = %release.name,
            version = %release.version,
            resources = created.len(),
            "release created"
        );
        Ok(())
    }
}

enum Planned<'a> {
    Controller(&'a ControllerSpec),
    Service(&'a ServiceSpec),
}

impl Planned<'_> {
    fn reference(&self) -> ResourceRef {
        match self {
            Planned::Controller(spec) => ResourceRef::controller(spec.name()),
            Planned::Service(spec) => ResourceRef::service(spec.name()),
        }
    }

    async fn create(&self, client: &dyn ClusterClient, namespace: &str) -> ClientResult<()> {
        match self {
            Planned::Controller(spec) => client.create_controller(namespace, spec).await,
            Planned::Service(spec) => client.create_service(namespace, spec).await,
        }
    }
}
