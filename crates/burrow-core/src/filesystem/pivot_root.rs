//! Secure root filesystem switching via `pivot_root(2)`.
//!
//! More secure than `chroot` because it actually changes the root mount
//! point rather than just the process's view of `/`. Must run inside a
//! private mount namespace.

use std::path::Path;

use burrow_common::error::{BurrowError, Result};
use nix::mount::{MntFlags, MsFlags};

use crate::sys_err;

/// Directory under the new root that receives the old root.
pub const PUT_OLD_DIR: &str = ".pivot_root";

/// Makes `new_root` the process root and detaches the old one.
///
/// Steps: make `/` recursively private so nothing propagates back to the
/// host; bind `new_root` onto itself so it is a mount point; pivot into
/// it with the old root parked under [`PUT_OLD_DIR`]; `chdir("/")`; lazily
/// unmount and remove the parked root.
///
/// A failure at any step leaves the process unusable; the caller must
/// abort the container and tear down its workspace.
///
/// # Errors
///
/// Returns an error naming the step that failed.
pub fn switch_root(new_root: &Path) -> Result<()> {
    tracing::info!(new_root = %new_root.display(), "performing pivot_root");

    nix::mount::mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(sys_err("make / private"))?;

    nix::mount::mount(
        Some(new_root),
        new_root,
        Some("bind"),
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(sys_err("bind new root onto itself"))?;

    let put_old = new_root.join(PUT_OLD_DIR);
    create_put_old(&put_old)?;

    nix::unistd::pivot_root(new_root, &put_old).map_err(sys_err("pivot_root"))?;
    nix::unistd::chdir("/").map_err(sys_err("chdir to new root"))?;

    let parked = Path::new("/").join(PUT_OLD_DIR);
    nix::mount::umount2(&parked, MntFlags::MNT_DETACH).map_err(sys_err("unmount old root"))?;
    std::fs::remove_dir(&parked).map_err(|e| BurrowError::Syscall {
        stage: "remove old root directory",
        source: e,
    })?;

    tracing::debug!("root switched");
    Ok(())
}

/// Creates the directory that will hold the old root, tolerating a
/// leftover one from an earlier start of the same container.
fn create_put_old(put_old: &Path) -> Result<()> {
    match std::fs::create_dir(put_old) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(BurrowError::Syscall {
            stage: "create old root directory",
            source: e,
        }),
    }
}
