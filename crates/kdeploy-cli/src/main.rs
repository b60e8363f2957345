use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "kdeploy",
    about = "kdeploy — upgrade kubeware deployed on a cluster",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Connection settings file (API endpoint, client certificate, CA).
    #[arg(short, long, env = "KDEPLOY_CONFIG", default_value = "kdeploy.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upgrade a deployed kubeware to the version of a local package.
    ///
    /// Strategies:
    ///
    ///   recreate (default) deletes every controller and service of the
    ///   deployed kubeware, then creates the new release. The kubeware is
    ///   unavailable between the two steps.
    ///
    ///   rolling replaces replicas batch by batch, waiting for each new
    ///   batch to become ready before shrinking the old controller.
    ///
    /// Ctrl-C stops the upgrade after in-flight cluster calls complete.
    Upgrade(commands::upgrade::UpgradeArgs),
    /// Show the version of a kubeware deployed in a namespace.
    Status {
        /// Kubeware name, as found in its `kubeware` label.
        name: String,
        #[arg(short, long, env = "KDEPLOY_NAMESPACE", default_value = "default")]
        namespace: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("kdeploy=info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Upgrade(args) => commands::upgrade::run(&cli.config, args).await,
        Commands::Status { name, namespace } => {
            commands::status::run(&cli.config, &namespace, &name).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
