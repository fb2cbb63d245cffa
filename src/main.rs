//! # restic Node Agent
//!
//! Per-node daemon (deployed as a DaemonSet) that backs up and restores pod
//! volumes with restic.
//!
//! ## Overview
//!
//! 1. **Provisions credentials** - resolves the default `BackupStorageLocation`
//!    and places provider credentials (Azure storage account name and key)
//!    into the environment restic runs with
//! 2. **Watches node-scoped state** - pods on this node and the repository
//!    password secret, each in a local cache
//! 3. **Runs two controllers** - `PodVolumeBackup` and `PodVolumeRestore`
//! 4. **Shuts down gracefully** - SIGTERM/SIGINT cancels every task and the
//!    process exits only after all of them have finished
//!
//! ## Usage
//!
//! ```bash
//! HEPTIO_ARK_NAMESPACE=heptio-ark NODE_NAME=node-7 ark-restic server --log-level info
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use restic_node_agent::cli::{Cli, Command, ServerArgs};
use restic_node_agent::client::ArkV1Client;
use restic_node_agent::config::AgentConfig;
use restic_node_agent::observability::metrics;
use restic_node_agent::provider::{ArmStorageKeyResolver, CredentialProvisioner};
use restic_node_agent::runtime::initialization::{init_tracing, install_crypto_provider, log_build_info};
use restic_node_agent::runtime::{NodeAgent, Orchestrator, StartupError};
use restic_node_agent::server::{start_server, ServerState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Server(args) => run_server(args).await,
    }
}

async fn run_server(args: ServerArgs) -> Result<()> {
    install_crypto_provider();
    init_tracing(args.log_level);

    info!(log_level = ?args.log_level, "Starting restic server");
    log_build_info();

    let config = AgentConfig::from_env()
        .map_err(StartupError::from)
        .context("Failed to load agent configuration")?;
    info!(
        namespace = %config.namespace,
        node = %config.node_name,
        restic = %config.restic_binary.display(),
        "Agent configuration loaded"
    );

    metrics::register_metrics().context("Failed to register metrics")?;

    let kube_config = ArkV1Client::default_config()
        .await
        .map_err(StartupError::from)
        .context("Failed to load Kubernetes client configuration")?;
    let client = ArkV1Client::new_for_config(kube_config)
        .map_err(StartupError::from)
        .context("Failed to create Kubernetes client")?;

    let token = CancellationToken::new();
    let provisioner = CredentialProvisioner::new(
        &config.namespace,
        client.backup_storage_locations(&config.namespace),
        ArmStorageKeyResolver::from_env(),
    );
    let workload = NodeAgent::new(client, &config);
    let orchestrator = Orchestrator::new(
        provisioner,
        workload,
        args.default_backup_storage_location,
        token.clone(),
    )
    .with_shutdown_progress_interval(config.shutdown_progress_interval());

    let server_state = Arc::new(ServerState {
        lifecycle: orchestrator.lifecycle(),
    });
    let metrics_port = config.metrics_port;
    orchestrator.registry().spawn("http-server", async move {
        if let Err(e) = start_server(metrics_port, server_state, token).await {
            error!("HTTP server error: {}", e);
        }
    });

    orchestrator.run().await.context("restic server failed")?;
    info!("restic server stopped");
    Ok(())
}
