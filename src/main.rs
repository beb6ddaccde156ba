//! AutoScaling Alias Registry
//!
//! Bastion mode runs the persistent registry and its HTTP surface. Node mode
//! runs the instance-side join flow once, then idles until told to leave.

use asreg_bastion::cloud::{CloudClient, Ec2CloudClient};
use asreg_bastion::config::{BastionSettings, ConfigStore, NodeSettings};
use asreg_bastion::daemon::signals::setup_signal_handlers;
use asreg_bastion::http::BastionServer;
use asreg_bastion::{node, AliasRegistry, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "asreg-bastion")]
#[command(about = "AutoScaling alias registry agent", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ASREG_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// AWS region for the cloud client (defaults to the SDK's own resolution)
    #[arg(long, env = "ASREG_CLOUD_REGION")]
    region: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bastion: persistent registry + HTTP surface.
    Bastion {
        /// Address to listen on.
        #[arg(long, env = "ASREG_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
        listen_addr: SocketAddr,

        /// Path to the embedded KV store directory.
        #[arg(long, env = "ASREG_STORE_PATH", default_value = "asreg-store")]
        store_path: PathBuf,

        /// Path to the scaling-group config YAML file.
        #[arg(long, env = "ASREG_CONFIG", default_value = "autoscaling.yaml")]
        config_path: PathBuf,
    },

    /// Run a node agent: join once after a start-up delay, then idle.
    Node {
        /// Base URL of the bastion, e.g. `https://bastion.internal:8080`.
        #[arg(long, env = "ASREG_BASTION_URL")]
        bastion_url: String,

        /// Seconds to wait before attempting to join.
        #[arg(long, env = "ASREG_JOIN_WAIT_SECONDS", default_value = "30")]
        join_wait_seconds: u64,

        /// Where to persist the metric config the bastion returns on join.
        #[arg(long, env = "ASREG_METRIC_CONFIG", default_value = "metric-config.yaml")]
        metric_config_path: PathBuf,
    },

    /// Deregister an instance from its bastion. Errors are reported, not
    /// retried (spec.md §4.F).
    Leave {
        /// Base URL of the bastion.
        #[arg(long, env = "ASREG_BASTION_URL")]
        bastion_url: String,

        /// Instance id to deregister.
        #[arg(long)]
        instance_id: String,
    },

    /// Validate a scaling-group config file without starting anything.
    ValidateConfig {
        #[arg(value_name = "CONFIG")]
        config_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    info!("asreg-bastion v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Bastion { listen_addr, store_path, config_path } => {
            run_bastion(BastionSettings {
                listen_addr,
                store_path,
                config_path,
                cloud_region: cli.region,
            })
            .await?;
        },

        Commands::Node { bastion_url, join_wait_seconds, metric_config_path } => {
            run_node(NodeSettings { bastion_url, join_wait_seconds, metric_config_path }, cli.region).await?;
        },

        Commands::Leave { bastion_url, instance_id } => {
            node::leave(&bastion_url, &instance_id).await?;
            println!("left group");
        },

        Commands::ValidateConfig { config_path } => {
            let store = ConfigStore::new(config_path);
            let config = store.load()?;
            config.validate()?;
            println!("configuration valid: {} group(s)", config.autoscalings.len());
        },
    }

    Ok(())
}

async fn run_bastion(settings: BastionSettings) -> Result<()> {
    let registry = AliasRegistry::open(&settings.store_path)?;
    let config_store = ConfigStore::new(&settings.config_path);
    let cloud: Arc<dyn CloudClient> = Arc::new(Ec2CloudClient::new(settings.cloud_region.clone()).await);

    let server = BastionServer::new(settings.listen_addr, registry, cloud, config_store);

    let (_shutdown_tx, shutdown_rx) = setup_signal_handlers();
    server.run(shutdown_rx).await
}

async fn run_node(settings: NodeSettings, region: Option<String>) -> Result<()> {
    let cloud = Ec2CloudClient::new(region).await;
    node::join(&cloud, &settings).await?;

    let (_shutdown_tx, mut shutdown_rx) = setup_signal_handlers();
    shutdown_rx.recv().await.ok();
    info!("node agent shutting down");
    Ok(())
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}
