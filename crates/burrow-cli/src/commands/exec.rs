//! `burrow exec`: run a command inside a running container.

use anyhow::Context;
use burrow_runtime::engine::Engine;
use clap::Args;

/// Arguments for the `exec` command.
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Container name.
    pub container: String,

    /// Command to execute.
    #[arg(trailing_var_arg = true, required = true)]
    pub command: Vec<String>,
}

/// Executes the `exec` command.
///
/// Enters the container's namespaces, runs the command, forwards its
/// output, and exits with its status.
///
/// # Errors
///
/// Returns an error if the container is not running or the command
/// cannot be started.
pub fn execute(engine: &Engine, args: &ExecArgs) -> anyhow::Result<()> {
    let output = engine
        .exec(&args.container, &args.command)
        .with_context(|| format!("failed to exec in {}", args.container))?;

    print!("{}", output.stdout);
    if !output.stderr.is_empty() {
        #[allow(clippy::print_stderr)]
        {
            eprint!("{}", output.stderr);
        }
    }

    std::process::exit(output.exit_code);
}
