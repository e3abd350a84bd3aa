//! skylift - main entry point.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use skylift::cluster::CommandClusterControl;
use skylift::config::Config;
use skylift::handoff::{CredentialHandoff, HttpTokenExchanger, TokenExchanger};
use skylift::jobs::JobRegistry;
use skylift::server::{self, AppState};
use skylift::vault::CredentialVault;

#[derive(Parser, Debug)]
#[command(name = "skylift")]
#[command(about = "Web console for launching and monitoring cluster deployments")]
#[command(version)]
struct Args {
    /// Bind address (overrides SKYLIFT_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides SKYLIFT_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Data directory for credential artifacts (overrides SKYLIFT_DATA_DIR)
    #[arg(long)]
    data_dir: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("skylift=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!("Starting skylift console...");

    let mut config = Config::from_env()?;
    if let Some(host) = args.host {
        config.http.host = host;
    }
    if let Some(port) = args.port {
        config.http.port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.provisioner.scratch_dir = data_dir.join("runs");
        config.vault.data_dir = data_dir;
    }

    let vault = Arc::new(CredentialVault::new(&config.vault.data_dir)?);
    tracing::info!("Credential vault at {}", vault.data_dir().display());

    let exchanger: Arc<dyn TokenExchanger> = Arc::new(HttpTokenExchanger::new(
        Duration::from_secs(config.oauth.exchange_timeout_secs),
    )?);
    let handoff = Arc::new(CredentialHandoff::new(
        Arc::clone(&vault),
        exchanger,
        config.oauth.clone(),
    ));

    let cluster = Arc::new(CommandClusterControl::new(config.provisioner.clone()));
    let registry = Arc::new(JobRegistry::new(cluster));
    tracing::info!(command = %config.provisioner.command, "Cluster tools configured");

    let state = AppState { registry, handoff };

    server::start(state, &config.http.host, config.http.port)
        .await
        .map_err(|e| anyhow::anyhow!("server error: {}", e))?;

    Ok(())
}
