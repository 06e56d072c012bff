//! `burrow logs`: print a container's log.

use anyhow::Context;
use burrow_runtime::engine::Engine;
use clap::Args;

/// Arguments for the `logs` command.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Container name.
    pub container: String,
}

/// Executes the `logs` command.
///
/// # Errors
///
/// Returns an error if the container is not found or its log cannot be
/// read.
pub fn execute(engine: &Engine, args: &LogsArgs) -> anyhow::Result<()> {
    let logs = engine
        .logs(&args.container)
        .with_context(|| format!("failed to read logs of {}", args.container))?;
    print!("{logs}");
    Ok(())
}
