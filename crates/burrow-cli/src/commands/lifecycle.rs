//! `burrow start`, `burrow restart`, and `burrow rm`.

use anyhow::Context;
use burrow_runtime::engine::Engine;
use clap::Args;

/// A single container name.
#[derive(Args, Debug)]
pub struct NameArgs {
    /// Container name.
    pub container: String,
}

/// Arguments for the `rm` command.
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Container name.
    pub container: String,

    /// Kill the container first if it is running.
    #[arg(short, long)]
    pub force: bool,
}

/// Starts a stopped container.
///
/// # Errors
///
/// Returns an error if it is running, unknown, or fails to launch.
pub fn start(engine: &Engine, args: &NameArgs) -> anyhow::Result<()> {
    let record = engine
        .start_by_name(&args.container)
        .with_context(|| format!("failed to start {}", args.container))?;
    println!("{}", record.name);
    Ok(())
}

/// Restarts a container.
///
/// # Errors
///
/// Returns an error if stopping or starting fails.
pub fn restart(engine: &Engine, args: &NameArgs) -> anyhow::Result<()> {
    let record = engine
        .restart(&args.container)
        .with_context(|| format!("failed to restart {}", args.container))?;
    println!("{}", record.name);
    Ok(())
}

/// Removes a container.
///
/// # Errors
///
/// Returns an error if it is running and `--force` was not given.
pub fn remove(engine: &Engine, args: &RmArgs) -> anyhow::Result<()> {
    engine
        .remove(&args.container, args.force)
        .with_context(|| format!("failed to remove {}", args.container))?;
    println!("{}", args.container);
    Ok(())
}
