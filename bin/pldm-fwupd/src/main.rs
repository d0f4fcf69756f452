//! ---
//! pldm_section: "05-daemon"
//! pldm_subsection: "binary"
//! pldm_type: "source"
//! pldm_scope: "code"
//! pldm_description: "Binary entrypoint for the PLDM firmware-update daemon."
//! pldm_version: "v0.0.0-prealpha"
//! pldm_owner: "tbd"
//! ---
mod standalone;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pldm_bus::{InMemoryObjectServer, InMemoryServiceManager, ObjectServer, ServiceManager};
use pldm_common::config::AppConfig;
use pldm_common::logging::init_tracing;
use pldm_fw_update::{
    AggregateDispatcher, ComponentInventoryModel, ConditionConfig, Reactor,
    StaticFirmwareInventory,
};
use tokio::signal;
use tracing::{error, info, warn};

use crate::standalone::{StandaloneSessionFactory, UnboundCommandHandler};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "PLDM firmware-update daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the firmware-update reactor")]
    Run,
    #[command(about = "Show the setup targets bound to a component")]
    Conditions {
        #[arg(value_name = "COMPONENT")]
        component: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("/etc/pldm/fwupd.toml"));
    candidates.push(PathBuf::from("configs/fwupd.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let config = loaded.config;
    init_tracing("pldm-fwupd", &config.logging)?;
    info!(source = %loaded.source.display(), "configuration loaded");

    let bindings = load_bindings(&config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config, bindings).await?,
        Commands::Conditions { component } => match bindings.pair_for(&component) {
            Some(pair) => {
                println!("{component}: pre={} post={}", pair.pre, pair.post);
            }
            None => {
                warn!(component = %component, "no setup targets bound");
                println!("{component}: no setup targets");
            }
        },
    }

    Ok(())
}

fn load_bindings(config: &AppConfig) -> Result<ConditionConfig> {
    match &config.conditions.descriptor {
        Some(path) => {
            let bindings = ConditionConfig::load(path).with_context(|| {
                format!("failed to load condition descriptor {}", path.display())
            })?;
            info!(path = %path.display(), components = bindings.len(), "condition bindings loaded");
            Ok(bindings)
        }
        None => {
            info!("no condition descriptor configured; components run ungated");
            Ok(ConditionConfig::default())
        }
    }
}

async fn run_daemon(config: AppConfig, bindings: ConditionConfig) -> Result<()> {
    let server = Arc::new(InMemoryObjectServer::new());
    let manager: Arc<dyn ServiceManager> = Arc::new(InMemoryServiceManager::new());
    let firmware = Arc::new(StaticFirmwareInventory::new());
    standalone::seed(&config.standalone, &server, &firmware)?;

    let object_server: Arc<dyn ObjectServer> = server;
    let dispatcher = Arc::new(AggregateDispatcher::new(Box::new(UnboundCommandHandler)));
    let inventory = Arc::new(ComponentInventoryModel::new(
        object_server,
        Arc::clone(&dispatcher),
        &config.inventory,
    ));
    let (reactor, handle) = Reactor::new(
        dispatcher,
        Arc::clone(&inventory),
        firmware,
        Arc::new(bindings),
        Box::new(StandaloneSessionFactory::new(manager)),
        config.reactor.queue_depth,
    );
    let reactor_task = tokio::spawn(reactor.run());

    for endpoint in &config.standalone.endpoints {
        let created = handle
            .discover(endpoint.eid, endpoint.inventory_path.as_str())
            .await
            .with_context(|| format!("failed to announce endpoint {}", endpoint.eid))?;
        info!(eid = endpoint.eid, created, "endpoint discovered");
    }

    info!(
        endpoints = config.standalone.endpoints.len(),
        "daemon running; waiting for termination signal"
    );
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    if let Err(err) = handle.shutdown().await {
        warn!(error = %err, "reactor already stopped");
    }
    match reactor_task.await {
        Ok(stats) => info!(
            requests = stats.requests,
            unclaimed = stats.unclaimed,
            components = stats.components_created,
            remaining = inventory.component_count(),
            "reactor shutdown complete"
        ),
        Err(err) => error!(error = %err, "reactor task join error"),
    }
    Ok(())
}
