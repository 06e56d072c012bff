//! `burrow stop`: stop running containers.

use anyhow::Context;
use burrow_runtime::engine::Engine;
use clap::Args;

/// Arguments for the `stop` command.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Container names to stop.
    #[arg(required = true)]
    pub containers: Vec<String>,
}

/// Executes the `stop` command.
///
/// Every named container is attempted.
///
/// # Errors
///
/// Returns the first failure after trying all of them.
pub fn execute(engine: &Engine, args: &StopArgs) -> anyhow::Result<()> {
    let mut first_err = None;
    for name in &args.containers {
        match engine.stop_by_name(name) {
            Ok(record) => println!("{}", record.name),
            Err(e) => {
                tracing::error!(name = %name, error = %e, "stop failed");
                let _ = first_err.get_or_insert(e);
            }
        }
    }
    first_err.map_or(Ok(()), |e| Err(e).context("failed to stop container"))
}
