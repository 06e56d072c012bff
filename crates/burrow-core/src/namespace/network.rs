//! Named network namespaces.
//!
//! The runtime creates a namespace under `/var/run/netns/<name>` with
//! `ip netns add`, lets the container init join it, and configures the
//! container side of the veth pair from a host thread that temporarily
//! enters it.
//!
//! The network namespace is a per-thread attribute. Anything that enters
//! a namespace must therefore stay on one OS thread until it switches
//! back; [`run_in_netns`] does this on a dedicated scoped thread so the
//! caller's thread is never moved.

use std::fs::File;
use std::path::Path;

use burrow_common::command;
use burrow_common::error::{BurrowError, Result};
use nix::sched::CloneFlags;

use crate::sys_err;

/// Handle to the calling thread's own network namespace.
const THREAD_NETNS: &str = "/proc/thread-self/ns/net";

/// Creates the named network namespace `name`.
///
/// # Errors
///
/// Returns an error if `ip netns add` fails, e.g. because the name is
/// taken.
pub fn create_named(name: &str) -> Result<()> {
    let _ = command::run_tool("ip", &["netns", "add", name])?;
    tracing::info!(netns = name, "network namespace created");
    Ok(())
}

/// Deletes the named network namespace `name`.
///
/// # Errors
///
/// Returns an error if `ip netns delete` fails.
pub fn delete_named(name: &str) -> Result<()> {
    let _ = command::run_tool("ip", &["netns", "delete", name])?;
    tracing::info!(netns = name, "network namespace deleted");
    Ok(())
}

/// Moves the calling thread into the namespace at `path` for good.
///
/// Used by the container init before it execs the user command.
///
/// # Errors
///
/// Returns an error if the namespace cannot be opened or joined.
pub fn join(path: &Path) -> Result<()> {
    let target = File::open(path).map_err(|e| BurrowError::io(path, e))?;
    nix::sched::setns(&target, CloneFlags::CLONE_NEWNET).map_err(sys_err("setns"))?;
    tracing::debug!(netns = %path.display(), "joined network namespace");
    Ok(())
}

/// Keeps the current thread inside a foreign network namespace and
/// switches it back to the original one on drop.
#[derive(Debug)]
pub struct NetnsGuard {
    origin: File,
}

impl NetnsGuard {
    /// Enters the namespace at `path`, remembering the current one.
    ///
    /// # Errors
    ///
    /// Returns an error if either namespace handle cannot be opened or
    /// the switch fails.
    pub fn enter(path: &Path) -> Result<Self> {
        let origin = File::open(THREAD_NETNS).map_err(|e| BurrowError::io(THREAD_NETNS, e))?;
        join(path)?;
        Ok(Self { origin })
    }
}

impl Drop for NetnsGuard {
    fn drop(&mut self) {
        if let Err(e) = nix::sched::setns(&self.origin, CloneFlags::CLONE_NEWNET) {
            tracing::error!(error = %e, "failed to restore original network namespace");
        }
    }
}

/// Runs `f` on a fresh thread that has entered the namespace at `path`.
///
/// The thread is joined before returning and its namespace is restored
/// before it exits.
///
/// # Errors
///
/// Returns the error from entering the namespace or from `f`, or a
/// configuration error if the worker thread panicked.
pub fn run_in_netns<T, F>(path: &Path, f: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> Result<T> + Send,
{
    std::thread::scope(|scope| {
        scope
            .spawn(|| {
                let _guard = NetnsGuard::enter(path)?;
                f()
            })
            .join()
            .unwrap_or_else(|_| {
                Err(BurrowError::config(format!(
                    "worker thread inside {} panicked",
                    path.display()
                )))
            })
    })
}
