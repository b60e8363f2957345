//! The `ClusterClient` capability trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kdeploy_core::version::parse_version;
use kdeploy_core::{
    kubeware_selector, ControllerSpec, DeployedResource, Labels, ResourceRef, ServiceSpec,
};

use crate::error::ClientResult;
use crate::readiness::{self, ReadyPolicy};

/// Replica counts of a controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStatus {
    /// Desired replicas (`spec.replicas`).
    pub replicas: u32,
    /// Replicas reported ready by the control plane.
    pub ready_replicas: u32,
}

/// Everything a rollout strategy may ask of the cluster.
///
/// Implementations must be safe to share between concurrent migrations
/// and must not cache cluster state between calls.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Controllers and services in `namespace` whose labels include all of `labels`.
    async fn query_by_labels(
        &self,
        namespace: &str,
        labels: &Labels,
    ) -> ClientResult<Vec<DeployedResource>>;

    async fn create_controller(&self, namespace: &str, spec: &ControllerSpec) -> ClientResult<()>;

    async fn create_service(&self, namespace: &str, spec: &ServiceSpec) -> ClientResult<()>;

    async fn delete_resource(&self, namespace: &str, resource: &ResourceRef) -> ClientResult<()>;

    async fn patch_service_selector(
        &self,
        namespace: &str,
        service: &str,
        selector: &Labels,
    ) -> ClientResult<()>;

    async fn scale_controller(
        &self,
        namespace: &str,
        controller: &str,
        replicas: u32,
    ) -> ClientResult<()>;

    async fn controller_status(
        &self,
        namespace: &str,
        controller: &str,
    ) -> ClientResult<ControllerStatus>;

    /// Version of `kubeware` deployed in `namespace`, if any.
    ///
    /// Resources of a half-finished rolling upgrade carry two versions;
    /// the highest one is reported.
    async fn find_deployed_version(
        &self,
        namespace: &str,
        kubeware: &str,
    ) -> ClientResult<Option<String>> {
        let resources = self
            .query_by_labels(namespace, &kubeware_selector(kubeware))
            .await?;
        Ok(highest_version(&resources))
    }

    /// Block until `replicas` replicas of `controller` are ready.
    async fn wait_ready(
        &self,
        namespace: &str,
        controller: &str,
        replicas: u32,
        policy: &ReadyPolicy,
    ) -> ClientResult<()> {
        readiness::wait_ready(self, namespace, controller, replicas, policy).await
    }
}

/// Highest `kubeware-version` label among `resources`.
///
/// Unparseable labels lose to any parseable one; if none parse, the
/// first label found is returned so the version gate can report it.
pub fn highest_version(resources: &[DeployedResource]) -> Option<String> {
    let labels: Vec<&str> = resources
        .iter()
        .filter_map(DeployedResource::version)
        .filter(|v| !v.trim().is_empty())
        .collect();

    labels
        .iter()
        .filter_map(|raw| parse_version(raw).ok().map(|v| (v, *raw)))
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, raw)| raw.to_string())
        .or_else(|| labels.first().map(|raw| raw.to_string()))
}
