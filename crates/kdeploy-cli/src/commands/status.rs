use std::path::Path;

use anyhow::Context;
use kdeploy_client::ClusterClient;

pub async fn run(config: &Path, namespace: &str, name: &str) -> anyhow::Result<()> {
    let client = super::connect(config)?;
    let deployed = client
        .find_deployed_version(namespace, name)
        .await
        .context("status")?;

    match deployed {
        Some(version) => println!("{name} {version} (namespace {namespace})"),
        None => println!("{name} is not deployed in namespace {namespace}"),
    }
    Ok(())
}
