//! Release and resource types shared across kdeploy crates.
//!
//! Controller and service documents are Kubernetes v1 JSON objects. The
//! core only reads the handful of fields it needs (`metadata.name`,
//! `spec.replicas`, `spec.selector`, pod template labels) and otherwise
//! passes the document through untouched.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Label carrying the kubeware name on every deployed resource.
pub const KUBEWARE_LABEL: &str = "kubeware";

/// Label carrying the kubeware version on every deployed resource.
pub const VERSION_LABEL: &str = "kubeware-version";

/// Label carrying the name of the template a resource was rendered from.
///
/// Rolling upgrades rename controllers, so this is how a renamed
/// controller is matched back to its spec.
pub const COMPONENT_LABEL: &str = "kubeware-component";

/// Label set (keys and values), ordered for stable output.
pub type Labels = BTreeMap<String, String>;

/// Errors raised while reading a resource document.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document has no metadata.name")]
    MissingName,

    #[error("document field {field} is malformed: {reason}")]
    Malformed { field: &'static str, reason: String },
}

// ── Resource references ───────────────────────────────────────────

/// The kinds of resource a kubeware release is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Controller,
    Service,
}

impl ResourceKind {
    /// Collection name in the v1 REST API.
    pub fn api_collection(&self) -> &'static str {
        match self {
            ResourceKind::Controller => "replicationcontrollers",
            ResourceKind::Service => "services",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Controller => f.write_str("controller"),
            ResourceKind::Service => f.write_str("service"),
        }
    }
}

/// A named resource of a given kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceRef {
    pub fn controller(name: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Controller,
            name: name.into(),
        }
    }

    pub fn service(name: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Service,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// A resource found in the cluster, with its metadata labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedResource {
    pub reference: ResourceRef,
    pub labels: Labels,
}

impl DeployedResource {
    pub fn name(&self) -> &str {
        &self.reference.name
    }

    pub fn kind(&self) -> ResourceKind {
        self.reference.kind
    }

    /// The template name this resource was rendered from, falling back
    /// to the resource name for resources deployed without the label.
    pub fn component(&self) -> &str {
        self.labels
            .get(COMPONENT_LABEL)
            .map(String::as_str)
            .unwrap_or(&self.reference.name)
    }

    pub fn version(&self) -> Option<&str> {
        self.labels.get(VERSION_LABEL).map(String::as_str)
    }
}

// ── Documents ─────────────────────────────────────────────────────

/// A replication controller document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerSpec {
    name: String,
    document: Value,
}

impl ControllerSpec {
    /// Parse a controller from its serialized JSON payload.
    pub fn from_json(payload: &[u8]) -> Result<Self, SpecError> {
        Self::from_value(serde_json::from_slice(payload)?)
    }

    pub fn from_value(document: Value) -> Result<Self, SpecError> {
        let name = document_name(&document)?;
        let spec = Self { name, document };
        // Validate the fields the rollout reads up front.
        spec.try_replicas()?;
        Ok(spec)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Desired replica count (`spec.replicas`, defaulting to 1).
    pub fn replicas(&self) -> u32 {
        self.try_replicas().unwrap_or(1)
    }

    fn try_replicas(&self) -> Result<u32, SpecError> {
        match self.document.pointer("/spec/replicas") {
            None | Some(Value::Null) => Ok(1),
            Some(v) => v
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| SpecError::Malformed {
                    field: "spec.replicas",
                    reason: format!("expected a non-negative integer, got {v}"),
                }),
        }
    }

    /// Pod selector (`spec.selector`).
    pub fn selector(&self) -> Labels {
        labels_at(&self.document, "/spec/selector")
    }

    /// Metadata labels (`metadata.labels`).
    pub fn labels(&self) -> Labels {
        labels_at(&self.document, "/metadata/labels")
    }

    /// Copy of this controller with a different replica count.
    pub fn with_replicas(&self, replicas: u32) -> Self {
        let mut document = self.document.clone();
        object_at(&mut document, &["spec"]).insert("replicas".into(), Value::from(replicas));
        Self {
            name: self.name.clone(),
            document,
        }
    }

    /// Copy of this controller under a version-suffixed identity.
    ///
    /// The new name is `<name>-<slug>`; the version label is added to the
    /// metadata labels, the selector and the pod template labels so the
    /// new controller never adopts the old controller's pods.
    pub fn versioned(&self, version: &str) -> Self {
        let name = versioned_name(&self.name, version);
        let mut document = self.document.clone();

        object_at(&mut document, &["metadata"]).insert("name".into(), Value::from(name.clone()));
        let labels = object_at(&mut document, &["metadata", "labels"]);
        labels.insert(VERSION_LABEL.into(), Value::from(version));
        labels
            .entry(COMPONENT_LABEL.to_string())
            .or_insert_with(|| Value::from(self.name.clone()));
        object_at(&mut document, &["spec", "selector"])
            .insert(VERSION_LABEL.into(), Value::from(version));
        object_at(&mut document, &["spec", "template", "metadata", "labels"])
            .insert(VERSION_LABEL.into(), Value::from(version));

        Self { name, document }
    }
}

/// A service document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    name: String,
    document: Value,
}

impl ServiceSpec {
    pub fn from_json(payload: &[u8]) -> Result<Self, SpecError> {
        Self::from_value(serde_json::from_slice(payload)?)
    }

    pub fn from_value(document: Value) -> Result<Self, SpecError> {
        let name = document_name(&document)?;
        Ok(Self { name, document })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn selector(&self) -> Labels {
        labels_at(&self.document, "/spec/selector")
    }

    pub fn labels(&self) -> Labels {
        labels_at(&self.document, "/metadata/labels")
    }

    /// Copy of this service labeled with `version`.
    ///
    /// The selector is left as rendered: it must keep matching the pods of
    /// both the draining and the growing controller during a rolling
    /// replace.
    pub fn versioned(&self, version: &str) -> Self {
        let mut document = self.document.clone();
        object_at(&mut document, &["metadata", "labels"])
            .insert(VERSION_LABEL.into(), Value::from(version));
        Self {
            name: self.name.clone(),
            document,
        }
    }
}

// ── Release ───────────────────────────────────────────────────────

/// The rendered target version of a kubeware, ready to roll out.
#[derive(Debug, Clone, PartialEq)]
pub struct Release {
    pub name: String,
    pub version: String,
    pub controllers: Vec<ControllerSpec>,
    pub services: Vec<ServiceSpec>,
}

impl Release {
    /// Label selector matching every resource of this kubeware.
    pub fn selector(&self) -> Labels {
        kubeware_selector(&self.name)
    }

    /// References to every resource in the release, controllers first.
    pub fn resources(&self) -> Vec<ResourceRef> {
        self.controllers
            .iter()
            .map(|c| ResourceRef::controller(c.name()))
            .chain(self.services.iter().map(|s| ResourceRef::service(s.name())))
            .collect()
    }
}

/// Label selector matching every resource of the named kubeware.
pub fn kubeware_selector(name: &str) -> Labels {
    Labels::from([(KUBEWARE_LABEL.to_string(), name.to_string())])
}

/// Name a controller takes when rolled to `version`.
///
/// The version is lowercased and every character outside `[a-z0-9]` is
/// replaced by `-`, keeping the result a valid resource name.
pub fn versioned_name(name: &str, version: &str) -> String {
    let slug: String = version
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("{name}-{slug}")
}

fn document_name(document: &Value) -> Result<String, SpecError> {
    document
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .ok_or(SpecError::MissingName)
}

/// Read a string map at a JSON pointer; non-string values are skipped.
pub fn labels_at(document: &Value, pointer: &str) -> Labels {
    document
        .pointer(pointer)
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Walk (and create) nested objects, returning the innermost one.
///
/// Non-object values along the path are replaced by empty objects.
pub fn object_at<'a>(document: &'a mut Value, path: &[&str]) -> &'a mut Map<String, Value> {
    if !document.is_object() {
        *document = Value::Object(Map::new());
    }
    let Value::Object(map) = document else {
        unreachable!("replaced by an object above")
    };
    match path.split_first() {
        None => map,
        Some((key, rest)) => {
            let child = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            object_at(child, rest)
        }
    }
}
