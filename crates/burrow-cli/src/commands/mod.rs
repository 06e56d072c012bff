//! CLI command definitions and dispatch.

pub mod exec;
pub mod images;
pub mod init;
pub mod inspect;
pub mod lifecycle;
pub mod logs;
pub mod network;
pub mod ps;
pub mod run;
pub mod stop;

use std::path::PathBuf;

use anyhow::Context;
use burrow_common::config::RuntimeConfig;
use burrow_common::constants;
use burrow_runtime::engine::Engine;
use clap::{Parser, Subcommand};

/// Burrow: a daemon-less container runtime.
#[derive(Parser, Debug)]
#[command(name = "burrow", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding containers, images, and networks.
    #[arg(long, global = true, env = "BURROW_ROOT", default_value = constants::DEFAULT_ROOT)]
    pub root: PathBuf,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create and start a container.
    Run(run::RunArgs),
    /// List containers.
    Ps(ps::PsArgs),
    /// Show a container's record as JSON.
    Inspect(inspect::InspectArgs),
    /// Print a container's log.
    Logs(logs::LogsArgs),
    /// Execute a command inside a running container.
    Exec(exec::ExecArgs),
    /// Stop a running container.
    Stop(stop::StopArgs),
    /// Start a stopped container.
    Start(lifecycle::NameArgs),
    /// Stop then start a container.
    Restart(lifecycle::NameArgs),
    /// Remove a container and its resources.
    Rm(lifecycle::RmArgs),
    /// List images available to `run`.
    Images(images::ImagesArgs),
    /// Manage container networks.
    #[command(subcommand)]
    Network(network::NetworkCommand),
    /// Container-side half of `run`; not for direct use.
    #[command(name = constants::INIT_SUBCOMMAND, hide = true)]
    Init,
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Init => init::execute(),
        command => dispatch(RuntimeConfig::with_root(cli.root), command),
    }
}

fn dispatch(config: RuntimeConfig, command: Command) -> anyhow::Result<()> {
    let engine = Engine::new(config).context("failed to open runtime state")?;
    match command {
        Command::Run(args) => run::execute(&engine, args),
        Command::Ps(args) => ps::execute(&engine, &args),
        Command::Inspect(args) => inspect::execute(&engine, &args),
        Command::Logs(args) => logs::execute(&engine, &args),
        Command::Exec(args) => exec::execute(&engine, &args),
        Command::Stop(args) => stop::execute(&engine, &args),
        Command::Start(args) => lifecycle::start(&engine, &args),
        Command::Restart(args) => lifecycle::restart(&engine, &args),
        Command::Rm(args) => lifecycle::remove(&engine, &args),
        Command::Images(args) => images::execute(&engine, &args),
        Command::Network(command) => network::execute(engine, command),
        Command::Init => init::execute(),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn init_is_reachable_by_its_reexec_name() {
        let cli = Cli::try_parse_from(["burrow", constants::INIT_SUBCOMMAND]).unwrap();
        assert!(matches!(cli.command, Command::Init));
    }

    #[test]
    fn root_flag_overrides_default() {
        let cli = Cli::try_parse_from(["burrow", "ps", "--root", "/tmp/burrow-test"]).unwrap();
        assert_eq!(cli.root, PathBuf::from("/tmp/burrow-test"));
    }
}
