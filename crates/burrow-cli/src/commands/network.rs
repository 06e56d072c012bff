//! `burrow network`: create, list, and remove networks.

use anyhow::Context;
use burrow_runtime::engine::Engine;
use clap::{Args, Subcommand};

use crate::output::Table;

/// Network subcommands.
#[derive(Subcommand, Debug)]
pub enum NetworkCommand {
    /// Create a network.
    Create(CreateArgs),
    /// List networks.
    Ls,
    /// Remove a network.
    Rm(RemoveArgs),
}

/// Arguments for `network create`.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Network driver.
    #[arg(long, default_value = "bridge")]
    pub driver: String,

    /// Subnet in CIDR notation, e.g. `192.168.10.0/24`.
    #[arg(long)]
    pub subnet: String,

    /// Network name; also the bridge device name.
    pub name: String,
}

/// Arguments for `network rm`.
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Network name.
    pub name: String,
}

/// Executes a network subcommand.
///
/// # Errors
///
/// Returns an error if the registry operation fails.
pub fn execute(mut engine: Engine, command: NetworkCommand) -> anyhow::Result<()> {
    match command {
        NetworkCommand::Create(args) => {
            let network = engine
                .create_network(&args.driver, &args.subnet, &args.name)
                .with_context(|| format!("failed to create network {}", args.name))?;
            println!("{}", network.name);
        }
        NetworkCommand::Ls => {
            let mut table = Table::new(&["NAME", "ID", "SUBNET", "GATEWAY", "DRIVER"]);
            for network in engine.list_networks() {
                table.row(vec![
                    network.name.clone(),
                    network.id.clone(),
                    network.subnet().to_string(),
                    network.gateway().to_string(),
                    network.driver.clone(),
                ]);
            }
            print!("{}", table.render());
        }
        NetworkCommand::Rm(args) => {
            engine
                .remove_network(&args.name)
                .with_context(|| format!("failed to remove network {}", args.name))?;
            println!("{}", args.name);
        }
    }
    Ok(())
}
