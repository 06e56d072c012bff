//! Mount utilities for container filesystem setup.
//!
//! Bind mounts for volumes on the host side, and the `/proc` and `/dev`
//! mounts the init process makes inside its new root.

use std::path::Path;

use burrow_common::error::Result;
use nix::mount::{MntFlags, MsFlags};

use crate::sys_err;

/// Bind-mounts `source` onto `target`.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
pub fn bind_mount(source: &Path, target: &Path) -> Result<()> {
    nix::mount::mount(
        Some(source),
        target,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(sys_err("bind mount"))?;
    tracing::debug!(
        source = %source.display(),
        target = %target.display(),
        "bind mount created"
    );
    Ok(())
}

/// Unmounts `target`, lazily if `detach` is set.
///
/// # Errors
///
/// Returns an error if the `umount2(2)` syscall fails.
pub fn unmount(target: &Path, detach: bool) -> Result<()> {
    let flags = if detach {
        MntFlags::MNT_DETACH
    } else {
        MntFlags::empty()
    };
    nix::mount::umount2(target, flags).map_err(sys_err("unmount"))?;
    tracing::debug!(target = %target.display(), "unmounted");
    Ok(())
}

/// Mounts a private `/proc` for the new pid namespace.
///
/// # Errors
///
/// Returns an error if the mount fails.
pub fn mount_proc() -> Result<()> {
    let flags = MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID | MsFlags::MS_NODEV;
    nix::mount::mount(
        Some("proc"),
        "/proc",
        Some("proc"),
        flags,
        None::<&str>,
    )
    .map_err(sys_err("mount /proc"))
}

/// Mounts a `tmpfs` scratch `/dev`.
///
/// # Errors
///
/// Returns an error if the mount fails.
pub fn mount_dev_tmpfs() -> Result<()> {
    nix::mount::mount(
        Some("tmpfs"),
        "/dev",
        Some("tmpfs"),
        MsFlags::MS_NOSUID | MsFlags::MS_STRICTATIME,
        Some("mode=755"),
    )
    .map_err(sys_err("mount /dev tmpfs"))
}
