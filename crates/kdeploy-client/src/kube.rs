//! `ClusterClient` over the control plane's v1 REST API.
//!
//! # Requests
//!
//! ```text
//! query_by_labels         GET    api/v1/namespaces/{ns}/{replicationcontrollers,services}?labelSelector=
//! create_controller       POST   api/v1/namespaces/{ns}/replicationcontrollers
//! create_service          POST   api/v1/namespaces/{ns}/services
//! delete_resource         DELETE api/v1/namespaces/{ns}/{collection}/{name}
//! patch_service_selector  PATCH  api/v1/namespaces/{ns}/services/{name}           (JSON patch)
//! scale_controller        PATCH  api/v1/namespaces/{ns}/replicationcontrollers/{name}  (merge patch)
//! controller_status       GET    api/v1/namespaces/{ns}/replicationcontrollers/{name}
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use kdeploy_core::{
    ConnectionConfig, ControllerSpec, DeployedResource, Labels, ResourceKind, ResourceRef,
    ServiceSpec,
};

use crate::client::{ClusterClient, ControllerStatus};
use crate::error::{ClientError, ClientResult};
use crate::rest::{RestClient, RestResponse};

/// Control-plane client speaking the v1 REST API.
#[derive(Debug, Clone)]
pub struct KubeClient {
    rest: RestClient,
}

impl KubeClient {
    pub fn new(config: &ConnectionConfig) -> ClientResult<Self> {
        Ok(Self::from_rest(RestClient::new(config)?))
    }

    pub fn from_rest(rest: RestClient) -> Self {
        Self { rest }
    }

    pub fn endpoint(&self) -> &str {
        self.rest.endpoint()
    }

    async fn list(
        &self,
        namespace: &str,
        kind: ResourceKind,
        labels: &Labels,
    ) -> ClientResult<Vec<DeployedResource>> {
        let path = format!(
            "{}?labelSelector={}",
            collection_path(namespace, kind),
            urlencoding::encode(&label_selector(labels))
        );
        let operation = format!("GET {}", collection_path(namespace, kind));
        let response = expect_success(&operation, self.rest.get(&path).await?)?;
        let list: ObjectList = response.json(&operation)?;

        Ok(list
            .items
            .into_iter()
            .map(|item| DeployedResource {
                reference: ResourceRef {
                    kind,
                    name: item.metadata.name,
                },
                labels: item.metadata.labels,
            })
            .collect())
    }

    async fn create(&self, namespace: &str, kind: ResourceKind, document: &serde_json::Value) -> ClientResult<()> {
        let path = collection_path(namespace, kind);
        let operation = format!("POST {path}");
        expect_success(&operation, self.rest.post_json(&path, document).await?)?;
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for KubeClient {
    async fn query_by_labels(
        &self,
        namespace: &str,
        labels: &Labels,
    ) -> ClientResult<Vec<DeployedResource>> {
        let mut found = self.list(namespace, ResourceKind::Controller, labels).await?;
        found.extend(self.list(namespace, ResourceKind::Service, labels).await?);
        debug!(%namespace, selector = %label_selector(labels), count = found.len(), "queried resources");
        Ok(found)
    }

    async fn create_controller(&self, namespace: &str, spec: &ControllerSpec) -> ClientResult<()> {
        self.create(namespace, ResourceKind::Controller, spec.document())
            .await?;
        info!(%namespace, controller = spec.name(), replicas = spec.replicas(), "created controller");
        Ok(())
    }

    async fn create_service(&self, namespace: &str, spec: &ServiceSpec) -> ClientResult<()> {
        self.create(namespace, ResourceKind::Service, spec.document())
            .await?;
        info!(%namespace, service = spec.name(), "created service");
        Ok(())
    }

    async fn delete_resource(&self, namespace: &str, resource: &ResourceRef) -> ClientResult<()> {
        let path = resource_path(namespace, resource.kind, &resource.name);
        let operation = format!("DELETE {path}");
        let query = match resource.kind {
            // Let the garbage collector remove the controller's pods.
            ResourceKind::Controller => "?propagationPolicy=Background",
            ResourceKind::Service => "",
        };
        expect_success(&operation, self.rest.delete(&format!("{path}{query}")).await?)?;
        info!(%namespace, %resource, "deleted resource");
        Ok(())
    }

    async fn patch_service_selector(
        &self,
        namespace: &str,
        service: &str,
        selector: &Labels,
    ) -> ClientResult<()> {
        let path = resource_path(namespace, ResourceKind::Service, service);
        let operation = format!("PATCH {path}");
        expect_success(
            &operation,
            self.rest.json_patch(&path, &selector_patch(selector)).await?,
        )?;
        info!(%namespace, %service, selector = %label_selector(selector), "patched service selector");
        Ok(())
    }

    async fn scale_controller(
        &self,
        namespace: &str,
        controller: &str,
        replicas: u32,
    ) -> ClientResult<()> {
        let path = resource_path(namespace, ResourceKind::Controller, controller);
        let operation = format!("PATCH {path}");
        let patch = json!({ "spec": { "replicas": replicas } });
        expect_success(&operation, self.rest.merge_patch(&path, &patch).await?)?;
        info!(%namespace, %controller, replicas, "scaled controller");
        Ok(())
    }

    async fn controller_status(
        &self,
        namespace: &str,
        controller: &str,
    ) -> ClientResult<ControllerStatus> {
        let path = resource_path(namespace, ResourceKind::Controller, controller);
        let operation = format!("GET {path}");
        let response = expect_success(&operation, self.rest.get(&path).await?)?;
        let object: ControllerObject = response.json(&operation)?;
        Ok(ControllerStatus {
            replicas: object.spec.replicas.unwrap_or(1),
            ready_replicas: object.status.ready_replicas,
        })
    }
}

// ── Wire shapes ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<ListedObject>,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    metadata: ObjectMeta,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
    #[serde(default)]
    labels: Labels,
}

#[derive(Debug, Default, Deserialize)]
struct ControllerObject {
    #[serde(default)]
    spec: ControllerObjectSpec,
    #[serde(default)]
    status: ControllerObjectStatus,
}

#[derive(Debug, Default, Deserialize)]
struct ControllerObjectSpec {
    replicas: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ControllerObjectStatus {
    #[serde(default)]
    ready_replicas: u32,
}

// ── Helpers ───────────────────────────────────────────────────────

fn collection_path(namespace: &str, kind: ResourceKind) -> String {
    format!("api/v1/namespaces/{namespace}/{}", kind.api_collection())
}

fn resource_path(namespace: &str, kind: ResourceKind, name: &str) -> String {
    format!("{}/{name}", collection_path(namespace, kind))
}

/// `k1=v1,k2=v2` equality selector.
fn label_selector(labels: &Labels) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// JSON patch replacing a service's selector as a whole.
///
/// A merge patch would keep keys the new selector drops. `add` on an
/// existing member replaces it and also covers a service without one.
fn selector_patch(selector: &Labels) -> serde_json::Value {
    json!([{ "op": "add", "path": "/spec/selector", "value": selector }])
}

fn expect_success(operation: &str, response: RestResponse) -> ClientResult<RestResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(ClientError::from_status(operation, response.status, &response.body))
    }
}
