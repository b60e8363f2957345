//! In-process cluster used by tests and dry runs of the rollout logic.
//!
//! Controllers become fully ready the moment they are created or scaled,
//! unless marked with [`MemoryCluster::never_ready`]. Any operation can be
//! made to fail for a given resource with [`MemoryCluster::fail_on`].
//! Every mutation is appended to an event log so tests can replay the
//! order in which the cluster changed.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use kdeploy_core::{
    object_at, ControllerSpec, DeployedResource, Labels, ResourceKind, ResourceRef, ServiceSpec,
};

use crate::client::{ClusterClient, ControllerStatus};
use crate::error::{ClientError, ClientResult};

/// Client operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Query,
    Create,
    Delete,
    PatchSelector,
    Scale,
    Status,
}

/// A mutation applied to the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    Created { resource: ResourceRef, replicas: u32 },
    Deleted { resource: ResourceRef },
    Scaled { controller: String, replicas: u32 },
    SelectorPatched { service: String, selector: Labels },
}

#[derive(Debug, Clone)]
struct Stored {
    labels: Labels,
    document: Value,
    replicas: u32,
}

#[derive(Debug, Default)]
struct Inner {
    resources: BTreeMap<(String, ResourceRef), Stored>,
    failures: HashSet<(Operation, String)>,
    never_ready: HashSet<String>,
    events: Vec<ClusterEvent>,
}

/// Shared handle to an in-memory cluster. Clones see the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryCluster {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Place a controller without recording an event.
    pub fn seed_controller(&self, namespace: &str, spec: &ControllerSpec) {
        self.state().resources.insert(
            (namespace.to_string(), ResourceRef::controller(spec.name())),
            Stored {
                labels: spec.labels(),
                document: spec.document().clone(),
                replicas: spec.replicas(),
            },
        );
    }

    /// Place a service without recording an event.
    pub fn seed_service(&self, namespace: &str, spec: &ServiceSpec) {
        self.state().resources.insert(
            (namespace.to_string(), ResourceRef::service(spec.name())),
            Stored {
                labels: spec.labels(),
                document: spec.document().clone(),
                replicas: 0,
            },
        );
    }

    /// Make `operation` fail for `target`: a resource name, or the
    /// namespace for [`Operation::Query`].
    pub fn fail_on(&self, operation: Operation, target: &str) {
        self.state().failures.insert((operation, target.to_string()));
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Keep `controller` at zero ready replicas.
    pub fn never_ready(&self, controller: &str) {
        self.state().never_ready.insert(controller.to_string());
    }

    pub fn events(&self) -> Vec<ClusterEvent> {
        self.state().events.clone()
    }

    /// Every resource in `namespace`, controllers first.
    pub fn resources(&self, namespace: &str) -> Vec<DeployedResource> {
        self.state()
            .resources
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|((_, reference), stored)| DeployedResource {
                reference: reference.clone(),
                labels: stored.labels.clone(),
            })
            .collect()
    }

    pub fn contains(&self, namespace: &str, resource: &ResourceRef) -> bool {
        self.state()
            .resources
            .contains_key(&(namespace.to_string(), resource.clone()))
    }

    pub fn replicas(&self, namespace: &str, controller: &str) -> Option<u32> {
        self.state()
            .resources
            .get(&(namespace.to_string(), ResourceRef::controller(controller)))
            .map(|s| s.replicas)
    }

    pub fn document(&self, namespace: &str, resource: &ResourceRef) -> Option<Value> {
        self.state()
            .resources
            .get(&(namespace.to_string(), resource.clone()))
            .map(|s| s.document.clone())
    }

    pub fn service_selector(&self, namespace: &str, service: &str) -> Option<Labels> {
        self.document(namespace, &ResourceRef::service(service))
            .map(|doc| kdeploy_core::labels_at(&doc, "/spec/selector"))
    }

    fn create(
        &self,
        namespace: &str,
        reference: ResourceRef,
        labels: Labels,
        document: Value,
        replicas: u32,
    ) -> ClientResult<()> {
        let mut state = self.state();
        let operation = format!("POST {}", collection(namespace, reference.kind));
        check(&state, Operation::Create, &reference.name, &operation)?;

        let key = (namespace.to_string(), reference.clone());
        if state.resources.contains_key(&key) {
            return Err(ClientError::AlreadyExists { operation });
        }
        state.resources.insert(
            key,
            Stored {
                labels,
                document,
                replicas,
            },
        );
        state.events.push(ClusterEvent::Created {
            resource: reference,
            replicas,
        });
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn query_by_labels(
        &self,
        namespace: &str,
        labels: &Labels,
    ) -> ClientResult<Vec<DeployedResource>> {
        let state = self.state();
        check(
            &state,
            Operation::Query,
            namespace,
            &format!("GET api/v1/namespaces/{namespace}"),
        )?;

        Ok(state
            .resources
            .iter()
            .filter(|((ns, _), stored)| {
                ns == namespace
                    && labels
                        .iter()
                        .all(|(k, v)| stored.labels.get(k) == Some(v))
            })
            .map(|((_, reference), stored)| DeployedResource {
                reference: reference.clone(),
                labels: stored.labels.clone(),
            })
            .collect())
    }

    async fn create_controller(&self, namespace: &str, spec: &ControllerSpec) -> ClientResult<()> {
        self.create(
            namespace,
            ResourceRef::controller(spec.name()),
            spec.labels(),
            spec.document().clone(),
            spec.replicas(),
        )
    }

    async fn create_service(&self, namespace: &str, spec: &ServiceSpec) -> ClientResult<()> {
        self.create(
            namespace,
            ResourceRef::service(spec.name()),
            spec.labels(),
            spec.document().clone(),
            0,
        )
    }

    async fn delete_resource(&self, namespace: &str, resource: &ResourceRef) -> ClientResult<()> {
        let mut state = self.state();
        let operation = format!("DELETE {}", path(namespace, resource));
        check(&state, Operation::Delete, &resource.name, &operation)?;

        if state
            .resources
            .remove(&(namespace.to_string(), resource.clone()))
            .is_none()
        {
            return Err(ClientError::NotFound { operation });
        }
        state.events.push(ClusterEvent::Deleted {
            resource: resource.clone(),
        });
        Ok(())
    }

    async fn patch_service_selector(
        &self,
        namespace: &str,
        service: &str,
        selector: &Labels,
    ) -> ClientResult<()> {
        let mut state = self.state();
        let reference = ResourceRef::service(service);
        let operation = format!("PATCH {}", path(namespace, &reference));
        check(&state, Operation::PatchSelector, service, &operation)?;

        let Some(stored) = state.resources.get_mut(&(namespace.to_string(), reference)) else {
            return Err(ClientError::NotFound { operation });
        };
        let spec = object_at(&mut stored.document, &["spec"]);
        spec.insert(
            "selector".into(),
            serde_json::to_value(selector).unwrap_or_default(),
        );
        state.events.push(ClusterEvent::SelectorPatched {
            service: service.to_string(),
            selector: selector.clone(),
        });
        Ok(())
    }

    async fn scale_controller(
        &self,
        namespace: &str,
        controller: &str,
        replicas: u32,
    ) -> ClientResult<()> {
        let mut state = self.state();
        let reference = ResourceRef::controller(controller);
        let operation = format!("PATCH {}", path(namespace, &reference));
        check(&state, Operation::Scale, controller, &operation)?;

        let Some(stored) = state.resources.get_mut(&(namespace.to_string(), reference)) else {
            return Err(ClientError::NotFound { operation });
        };
        stored.replicas = replicas;
        object_at(&mut stored.document, &["spec"]).insert("replicas".into(), Value::from(replicas));
        state.events.push(ClusterEvent::Scaled {
            controller: controller.to_string(),
            replicas,
        });
        Ok(())
    }

    async fn controller_status(
        &self,
        namespace: &str,
        controller: &str,
    ) -> ClientResult<ControllerStatus> {
        let state = self.state();
        let reference = ResourceRef::controller(controller);
        let operation = format!("GET {}", path(namespace, &reference));
        check(&state, Operation::Status, controller, &operation)?;

        let Some(stored) = state.resources.get(&(namespace.to_string(), reference)) else {
            return Err(ClientError::NotFound { operation });
        };
        let ready = if state.never_ready.contains(controller) {
            0
        } else {
            stored.replicas
        };
        Ok(ControllerStatus {
            replicas: stored.replicas,
            ready_replicas: ready,
        })
    }
}

fn collection(namespace: &str, kind: ResourceKind) -> String {
    format!("api/v1/namespaces/{namespace}/{}", kind.api_collection())
}

fn path(namespace: &str, resource: &ResourceRef) -> String {
    format!("{}/{}", collection(namespace, resource.kind), resource.name)
}

fn check(state: &Inner, operation: Operation, target: &str, name: &str) -> ClientResult<()> {
    if state.failures.contains(&(operation, target.to_string())) {
        return Err(ClientError::UnexpectedStatus {
            operation: name.to_string(),
            status: 500,
            body: "injected failure".into(),
        });
    }
    Ok(())
}
