pub mod status;
pub mod upgrade;

use std::path::Path;

use anyhow::Context;
use kdeploy_client::KubeClient;
use kdeploy_core::KdeployConfig;
use tracing::debug;

/// Read the connection settings and build the cluster client.
fn connect(config: &Path) -> anyhow::Result<KubeClient> {
    let settings = KdeployConfig::from_file(config)
        .with_context(|| format!("config {}", config.display()))?;
    let client = KubeClient::new(&settings.connection).context("connect")?;
    debug!(endpoint = client.endpoint(), "cluster client ready");
    Ok(client)
}
