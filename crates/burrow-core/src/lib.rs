//! # burrow-core
//!
//! Low-level Linux isolation primitives for the Burrow runtime.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: clone flags for new containers, named network
//!   namespaces, and a guard that pins namespace switches to one thread.
//! - **Cgroups v1**: CPU share, CPU-set, and memory controllers.
//! - **Filesystem**: `OverlayFS`, bind mounts, and the `pivot_root` switch.
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! proper error handling and `// SAFETY:` documentation.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cgroup;
pub mod filesystem;
pub mod namespace;

use burrow_common::error::BurrowError;

/// Maps a `nix` error to a [`BurrowError::Syscall`] tagged with `stage`.
pub(crate) fn sys_err(stage: &'static str) -> impl FnOnce(nix::Error) -> BurrowError {
    move |errno| BurrowError::syscall(stage, errno as i32)
}
