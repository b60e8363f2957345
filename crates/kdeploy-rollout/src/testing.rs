//! Release fixtures shared by the strategy tests.

use kdeploy_core::{
    ControllerSpec, Release, ServiceSpec, COMPONENT_LABEL, KUBEWARE_LABEL, VERSION_LABEL,
};
use serde_json::json;

/// A guestbook controller as the package renderer would produce it.
pub fn controller(name: &str, replicas: u32, version: &str) -> ControllerSpec {
    ControllerSpec::from_value(json!({
        "kind": "ReplicationController",
        "metadata": {
            "name": name,
            "labels": {
                (KUBEWARE_LABEL): "guestbook",
                (VERSION_LABEL): version,
                (COMPONENT_LABEL): name
            }
        },
        "spec": {
            "replicas": replicas,
            "selector": { "app": name },
            "template": { "metadata": { "labels": { "app": name } } }
        }
    }))
    .unwrap()
}

pub fn service(name: &str, version: &str) -> ServiceSpec {
    ServiceSpec::from_value(json!({
        "kind": "Service",
        "metadata": {
            "name": name,
            "labels": {
                (KUBEWARE_LABEL): "guestbook",
                (VERSION_LABEL): version,
                (COMPONENT_LABEL): name
            }
        },
        "spec": { "selector": { "app": name }, "ports": [{ "port": 80 }] }
    }))
    .unwrap()
}

pub fn guestbook(version: &str, controllers: &[(&str, u32)], services: &[&str]) -> Release {
    Release {
        name: "guestbook".into(),
        version: version.into(),
        controllers: controllers
            .iter()
            .map(|(name, replicas)| controller(name, *replicas, version))
            .collect(),
        services: services.iter().map(|name| service(name, version)).collect(),
    }
}
