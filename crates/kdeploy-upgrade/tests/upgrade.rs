//! End-to-end upgrades: a package on disk, an in-memory cluster, and the
//! orchestrator in between.

use std::path::Path;
use std::sync::Arc;

use kdeploy_client::{ClusterClient, ClusterEvent, MemoryCluster, Operation};
use kdeploy_core::{
    GateError, Kubeware, KubewarePackage, LocalLoader, ResourceRef, SpecGenerator, VERSION_LABEL,
    versioned_name,
};
use kdeploy_rollout::{Cancellation, RolloutError, StrategyError};
use kdeploy_upgrade::{Orchestrator, Phase, UpgradeConfig, UpgradeError};
use tempfile::TempDir;

const CONTROLLER: &str = r#"{
  "kind": "ReplicationController",
  "metadata": { "name": "frontend", "labels": { "app": "frontend" } },
  "spec": {
    "replicas": "{{ replicas }}",
    "selector": { "app": "frontend" },
    "template": {
      "metadata": { "labels": { "app": "frontend" } },
      "spec": { "containers": [{ "name": "php-redis", "image": "guestbook:{{ image.tag }}" }] }
    }
  }
}"#;

const SERVICE: &str = r#"{
  "kind": "Service",
  "metadata": { "name": "frontend", "labels": { "app": "frontend" } },
  "spec": { "selector": { "app": "frontend" }, "ports": [{ "port": 80 }] }
}"#;

fn package(version: &str) -> TempDir {
    package_with(version, CONTROLLER)
}

fn package_with(version: &str, controller: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("services")).unwrap();
    std::fs::create_dir_all(root.join("controllers")).unwrap();
    std::fs::write(root.join("services/frontend.json"), SERVICE).unwrap();
    std::fs::write(root.join("controllers/frontend.json"), controller).unwrap();
    std::fs::write(
        root.join("kubeware.toml"),
        format!(
            r#"name = "guestbook"
version = "{version}"
services = ["services/frontend.json"]
controllers = ["controllers/frontend.json"]

[attributes]
replicas = 2

[attributes.image]
tag = "v3"
"#
        ),
    )
    .unwrap();
    dir
}

/// Render `version` of the package and seed it as if a previous run
/// had deployed it.
fn deploy(cluster: &MemoryCluster, version: &str) {
    let dir = package(version);
    let pkg = KubewarePackage::open(dir.path()).unwrap();
    let defaults = pkg.attribute_defaults();
    for spec in pkg.render_controllers(&defaults).unwrap() {
        cluster.seed_controller("web", &spec);
    }
    for spec in pkg.render_services(&defaults).unwrap() {
        cluster.seed_service("web", &spec);
    }
}

fn orchestrator(cluster: &MemoryCluster) -> Orchestrator {
    Orchestrator::new(Arc::new(cluster.clone()), Arc::new(LocalLoader))
}

fn config(dir: &Path) -> UpgradeConfig {
    UpgradeConfig::new(dir.to_str().unwrap(), "web")
}

#[tokio::test]
async fn downgrade_is_rejected_before_any_mutation() {
    let cluster = MemoryCluster::new();
    deploy(&cluster, "1.2.0");
    let target = package("1.1.9");

    let err = orchestrator(&cluster)
        .upgrade(&config(target.path()), &Cancellation::never())
        .await
        .unwrap_err();

    assert_eq!(err.phase(), Phase::Gate);
    assert!(matches!(
        &err,
        UpgradeError::Gate(GateError::DowngradeRejected { deployed, target })
            if deployed == "1.2.0" && target == "1.1.9"
    ));
    assert!(cluster.events().is_empty());
}

#[tokio::test]
async fn nothing_deployed_is_rejected() {
    let cluster = MemoryCluster::new();
    let target = package("1.0.0");

    let err = orchestrator(&cluster)
        .upgrade(&config(target.path()), &Cancellation::never())
        .await
        .unwrap_err();

    assert_eq!(err.phase(), Phase::Gate);
    assert!(matches!(err, UpgradeError::Gate(GateError::NotDeployed)));
    assert_eq!(
        err.to_string(),
        "kubeware is not deployed and thus it can't be upgraded"
    );
}

#[tokio::test]
async fn unknown_strategy_fails_without_mutations() {
    let cluster = MemoryCluster::new();
    deploy(&cluster, "1.0.0");
    let target = package("1.1.0");

    let err = orchestrator(&cluster)
        .upgrade(
            &config(target.path()).with_strategy("bogus"),
            &Cancellation::never(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.phase(), Phase::Strategy);
    assert!(matches!(
        err,
        UpgradeError::Strategy(StrategyError::UnknownStrategy(ref id)) if id == "bogus"
    ));
    assert!(cluster.events().is_empty());
}

#[tokio::test]
async fn rolling_upgrade_moves_everything_to_the_new_version() {
    let cluster = MemoryCluster::new();
    deploy(&cluster, "1.0.0");
    let target = package("1.1.0");

    let report = orchestrator(&cluster)
        .upgrade(
            &config(target.path())
                .with_strategy("rolling")
                .with_attributes("replicas=3,image.tag=v4"),
            &Cancellation::never(),
        )
        .await
        .unwrap();

    assert_eq!(report.from_version, "1.0.0");
    assert_eq!(report.to_version, "1.1.0");
    assert_eq!(report.strategy, "rolling");
    assert_eq!(
        report.to_string(),
        "guestbook upgraded from 1.0.0 to 1.1.0 in namespace web (rolling strategy)"
    );

    let new_name = versioned_name("frontend", "1.1.0");
    assert_eq!(cluster.replicas("web", &new_name), Some(3));
    assert!(!cluster.contains("web", &ResourceRef::controller("frontend")));

    let document = cluster
        .document("web", &ResourceRef::controller(new_name.as_str()))
        .unwrap();
    assert_eq!(
        document["spec"]["template"]["spec"]["containers"][0]["image"],
        "guestbook:v4"
    );

    // The service keeps selecting by component, not by version.
    let selector = cluster.service_selector("web", "frontend").unwrap();
    assert_eq!(selector.get("app").map(String::as_str), Some("frontend"));
    assert!(!selector.contains_key(VERSION_LABEL));
    let pods = &document["spec"]["template"]["metadata"]["labels"];
    assert_eq!(pods["app"], "frontend");
    assert_eq!(pods[VERSION_LABEL], "1.1.0");

    let deployed = cluster.find_deployed_version("web", "guestbook").await.unwrap();
    assert_eq!(deployed.as_deref(), Some("1.1.0"));
}

#[tokio::test]
async fn empty_strategy_recreates() {
    let cluster = MemoryCluster::new();
    deploy(&cluster, "1.0.0");
    let target = package("1.1.0");

    let report = orchestrator(&cluster)
        .upgrade(&config(target.path()), &Cancellation::never())
        .await
        .unwrap();
    assert_eq!(report.strategy, "recreate");

    let events = cluster.events();
    assert!(matches!(&events[0], ClusterEvent::Deleted { .. }));
    assert!(matches!(events.last(), Some(ClusterEvent::Created { .. })));

    let versions: Vec<_> = cluster
        .resources("web")
        .iter()
        .map(|r| r.version().map(str::to_string))
        .collect();
    assert_eq!(versions, vec![Some("1.1.0".to_string()); 2]);
    assert_eq!(cluster.replicas("web", "frontend"), Some(2));
}

#[tokio::test]
async fn reapplying_the_deployed_version_is_allowed() {
    let cluster = MemoryCluster::new();
    deploy(&cluster, "1.1.0");
    let target = package("1.1.0");

    let report = orchestrator(&cluster)
        .upgrade(
            &config(target.path()).with_strategy("rolling"),
            &Cancellation::never(),
        )
        .await
        .unwrap();
    assert_eq!(report.from_version, report.to_version);
}

#[tokio::test]
async fn malformed_override_fails_in_resolve() {
    let cluster = MemoryCluster::new();
    deploy(&cluster, "1.0.0");
    let target = package("1.1.0");

    let err = orchestrator(&cluster)
        .upgrade(
            &config(target.path()).with_attributes("replicas"),
            &Cancellation::never(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.phase(), Phase::Resolve);
    assert!(cluster.events().is_empty());
}

#[tokio::test]
async fn missing_package_fails_in_fetch() {
    let cluster = MemoryCluster::new();
    let dir = tempfile::tempdir().unwrap();

    let err = orchestrator(&cluster)
        .upgrade(&config(&dir.path().join("absent")), &Cancellation::never())
        .await
        .unwrap_err();
    assert_eq!(err.phase(), Phase::Fetch);
}

#[tokio::test]
async fn unknown_placeholder_fails_in_generate() {
    let cluster = MemoryCluster::new();
    deploy(&cluster, "1.0.0");
    let target = package_with("1.1.0", &CONTROLLER.replace("{{ replicas }}", "{{ scale }}"));

    let err = orchestrator(&cluster)
        .upgrade(&config(target.path()), &Cancellation::never())
        .await
        .unwrap_err();
    assert_eq!(err.phase(), Phase::Generate);
    assert!(err.to_string().contains("unknown attribute 'scale'"));
    assert!(cluster.events().is_empty());
}

#[tokio::test]
async fn failed_discovery_stops_at_the_gate() {
    let cluster = MemoryCluster::new();
    deploy(&cluster, "1.0.0");
    cluster.fail_on(Operation::Query, "web");
    let target = package("1.1.0");

    let err = orchestrator(&cluster)
        .upgrade(&config(target.path()), &Cancellation::never())
        .await
        .unwrap_err();
    assert_eq!(err.phase(), Phase::Gate);
    assert!(matches!(err, UpgradeError::Discovery(_)));
}

#[tokio::test]
async fn cancelled_upgrade_fails_in_rollout() {
    let cluster = MemoryCluster::new();
    deploy(&cluster, "1.0.0");
    let target = package("1.1.0");
    let (tx, rx) = tokio::sync::watch::channel(false);
    tx.send(true).unwrap();

    let err = orchestrator(&cluster)
        .upgrade(
            &config(target.path()).with_strategy("rolling"),
            &Cancellation::new(rx),
        )
        .await
        .unwrap_err();
    assert_eq!(err.phase(), Phase::Rollout);
    assert!(matches!(err, UpgradeError::Rollout(RolloutError::Cancelled)));
    assert!(cluster.events().is_empty());
}
