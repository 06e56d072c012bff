//! `burrow init`: the container-side half of `run`.
//!
//! Invoked by the runtime through `/proc/self/exe`, never by users.

use anyhow::Context;

/// Finishes container setup and execs the workload.
///
/// # Errors
///
/// Returns an error if any setup step fails; on success it never returns.
pub fn execute() -> anyhow::Result<()> {
    match burrow_runtime::init::init_entry().context("container init failed")? {}
}
