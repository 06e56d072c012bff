//! `burrow ps`: list containers.

use anyhow::Context;
use burrow_runtime::container::ContainerRecord;
use burrow_runtime::engine::Engine;
use clap::Args;

use crate::output::{self, Table};

/// Widest command shown before it is cut.
const COMMAND_WIDTH: usize = 30;

/// Arguments for the `ps` command.
#[derive(Args, Debug)]
pub struct PsArgs {
    /// Show all containers (including stopped and exited).
    #[arg(short, long)]
    pub all: bool,
}

/// Executes the `ps` command.
///
/// # Errors
///
/// Returns an error if the container records cannot be read.
pub fn execute(engine: &Engine, args: &PsArgs) -> anyhow::Result<()> {
    let containers = engine.list().context("failed to list containers")?;
    print!("{}", render(&containers, args.all));
    Ok(())
}

fn render(containers: &[ContainerRecord], all: bool) -> String {
    let mut table = Table::new(&["ID", "NAME", "PID", "STATUS", "IMAGE", "COMMAND", "CREATED"]);
    for c in containers.iter().filter(|c| all || c.is_running()) {
        table.row(vec![
            c.id.to_string(),
            c.name.clone(),
            c.pid.to_string(),
            c.status.to_string(),
            c.image.clone(),
            output::truncate(&c.command.join(" "), COMMAND_WIDTH),
            c.created_at.clone(),
        ]);
    }
    table.render()
}
