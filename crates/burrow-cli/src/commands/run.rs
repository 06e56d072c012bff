//! `burrow run`: create and start a container.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use burrow_common::types::ResourceLimits;
use burrow_runtime::container::ContainerConfig;
use burrow_runtime::engine::Engine;
use clap::Args;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Keep stdin attached.
    #[arg(short, long)]
    pub interactive: bool,

    /// Stay attached until the workload exits, then remove the container.
    #[arg(short, long)]
    pub tty: bool,

    /// Run in the background and keep the container after it exits.
    #[arg(short, long, conflicts_with_all = ["interactive", "tty"])]
    pub detach: bool,

    /// Container name; defaults to the generated id.
    #[arg(long)]
    pub name: Option<String>,

    /// Environment entry `KEY=VALUE`; repeatable.
    #[arg(short, long = "env")]
    pub env: Vec<String>,

    /// Volume `HOST:CONTAINER`; repeatable.
    #[arg(short, long = "volume")]
    pub volume: Vec<String>,

    /// Port forward `HOST:CONTAINER`; repeatable, needs `--net`.
    #[arg(short, long = "publish")]
    pub publish: Vec<String>,

    /// Network to attach to.
    #[arg(long)]
    pub net: Option<String>,

    /// CPU shares (relative weight).
    #[arg(long, default_value_t = 0)]
    pub cpu_shares: u64,

    /// CPUs the container may run on, e.g. `0-1`.
    #[arg(long, default_value = "")]
    pub cpuset: String,

    /// Memory ceiling, e.g. `100m`.
    #[arg(short, long, default_value = "")]
    pub memory: String,

    /// Image to run.
    pub image: String,

    /// Command and arguments to run in the container.
    #[arg(trailing_var_arg = true, required = true)]
    pub command: Vec<String>,
}

impl RunArgs {
    fn request(self) -> ContainerConfig {
        ContainerConfig {
            attached: (self.interactive || self.tty) && !self.detach,
            name: self.name,
            image: self.image,
            command: self.command,
            env: self.env,
            volumes: self.volume,
            port_mapping: self.publish,
            network: self.net,
            limits: ResourceLimits {
                cpu_shares: self.cpu_shares,
                cpuset_cpus: self.cpuset,
                memory_limit: self.memory,
            },
        }
    }
}

/// Executes the `run` command.
///
/// # Errors
///
/// Returns an error naming the setup stage that failed.
pub fn execute(engine: &Engine, args: RunArgs) -> anyhow::Result<()> {
    let request = args.request();
    if request.attached {
        hold_interrupts()?;
    }

    let record = engine.run(&request).context("failed to run container")?;
    if !request.attached {
        println!("{}", record.name);
    }
    Ok(())
}

/// Keeps Ctrl+C from killing the controller while an attached workload
/// runs, so the container is still torn down once it exits.
fn hold_interrupts() -> anyhow::Result<()> {
    let warned = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler(move || {
        if !warned.swap(true, Ordering::SeqCst) {
            tracing::warn!("interrupt received, waiting for the container to exit");
        }
    })
    .context("failed to set Ctrl+C handler")
}
