//! `burrow inspect`: dump a container's record.

use anyhow::Context;
use burrow_runtime::engine::Engine;
use clap::Args;

/// Arguments for the `inspect` command.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Container name.
    pub container: String,
}

/// Executes the `inspect` command.
///
/// # Errors
///
/// Returns an error if the container does not exist.
pub fn execute(engine: &Engine, args: &InspectArgs) -> anyhow::Result<()> {
    let record = engine
        .inspect(&args.container)
        .with_context(|| format!("failed to inspect {}", args.container))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
