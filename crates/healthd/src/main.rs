//! healthd: the healthgrid daemon.
//!
//! Single binary that assembles the healthgrid subsystems:
//! - File inventory + HTTP probes
//! - Per-service refresh loops and reconciliation
//! - Aggregation engine
//! - Result feeder + pilot light
//! - HTTP API + Prometheus metrics
//!
//! # Usage
//!
//! ```text
//! healthd run --config healthd.toml --inventory inventory.toml --port 8080
//! healthd check-config --config healthd.toml
//! ```

mod config;
mod daemon;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use healthgrid_inventory::{FileInventory, HttpProber};
use healthgrid_state::Inventory;
use tracing::info;

use crate::config::DaemonConfig;

#[derive(Parser)]
#[command(name = "healthd", about = "healthgrid daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Monitor the inventory and serve the health API.
    Run {
        /// Daemon config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Inventory file. Overrides `inventory.path` from the config.
        #[arg(long)]
        inventory: Option<PathBuf>,

        /// Port to listen on. Overrides `server.port` from the config.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Validate the config and inventory files, then exit.
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        inventory: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run {
            config,
            inventory,
            port,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(port) = port {
                config.server.port = port;
            }
            let inventory_path = config.inventory_path(inventory)?;
            daemon::run(config, &inventory_path).await
        }
        Command::CheckConfig { config, inventory } => {
            check_config(config.as_deref(), inventory).await
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,healthd=debug,healthgrid=debug"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<DaemonConfig> {
    match path {
        Some(path) => {
            let config = DaemonConfig::from_file(path)?;
            info!(path = ?path, "config loaded");
            Ok(config)
        }
        None => Ok(DaemonConfig::default()),
    }
}

async fn check_config(
    config: Option<&std::path::Path>,
    inventory: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = load_config(config)?;
    println!("{}", config.to_toml_string()?);

    let path = config.inventory_path(inventory)?;
    let inventory = FileInventory::load(&path, HttpProber::new(config.probe.timeout)).await?;
    let services = inventory.list_services_by_name(&[]).await;
    let categories = inventory.list_categories().await?;
    println!(
        "inventory {}: {} services, {} categories",
        path.display(),
        services.len(),
        categories.len()
    );
    Ok(())
}
