use std::path::Path;
use std::sync::Arc;

use clap::Args;
use kdeploy_core::LocalLoader;
use kdeploy_rollout::{Cancellation, RollingConfig};
use kdeploy_upgrade::{Orchestrator, UpgradeConfig};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Args)]
pub struct UpgradeArgs {
    /// Kubeware package: a local directory or file:// URI.
    #[arg(short, long, env = "KDEPLOY_KUBEWARE")]
    pub kubeware: String,

    /// Namespace the kubeware is deployed in.
    #[arg(short, long, env = "KDEPLOY_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Upgrade strategy: recreate or rolling. Empty selects recreate.
    #[arg(short, long, env = "KDEPLOY_UPGRADE_STRATEGY", default_value = "")]
    pub strategy: String,

    /// Attribute overrides, e.g. `replicas=3,image.tag=v4`.
    #[arg(short, long, env = "KDEPLOY_ATTRIBUTES", default_value = "")]
    pub attributes: String,

    /// Rolling: replicas migrated per step.
    #[arg(long, default_value_t = RollingConfig::default().batch_size)]
    pub batch_size: u32,

    /// Rolling: seconds to wait for each step's replicas to become ready.
    #[arg(long, default_value_t = RollingConfig::default().ready_timeout_secs)]
    pub ready_timeout_secs: u64,

    /// Rolling: first readiness poll interval, in milliseconds.
    #[arg(long, default_value_t = RollingConfig::default().poll_initial_ms)]
    pub poll_initial_ms: u64,

    /// Rolling: readiness poll interval cap, in milliseconds.
    #[arg(long, default_value_t = RollingConfig::default().poll_max_ms)]
    pub poll_max_ms: u64,
}

impl UpgradeArgs {
    pub fn into_config(self) -> UpgradeConfig {
        UpgradeConfig::new(self.kubeware, self.namespace)
            .with_strategy(self.strategy)
            .with_attributes(self.attributes)
            .with_rolling(RollingConfig {
                batch_size: self.batch_size,
                ready_timeout_secs: self.ready_timeout_secs,
                poll_initial_ms: self.poll_initial_ms,
                poll_max_ms: self.poll_max_ms,
            })
    }
}

pub async fn run(config: &Path, args: UpgradeArgs) -> anyhow::Result<()> {
    let client = super::connect(config)?;
    let upgrade = args.into_config();

    let (interrupt_tx, interrupt_rx) = watch::channel(false);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after in-flight operations");
            let _ = interrupt_tx.send(true);
        }
    });

    let orchestrator = Orchestrator::new(Arc::new(client), Arc::new(LocalLoader));
    let result = orchestrator
        .upgrade(&upgrade, &Cancellation::new(interrupt_rx))
        .await;
    interrupt.abort();

    match result {
        Ok(report) => {
            info!("{report}");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("{}: {}", e.phase(), e)),
    }
}
