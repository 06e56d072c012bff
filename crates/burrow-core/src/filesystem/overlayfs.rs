//! `OverlayFS` management for layered container filesystems.
//!
//! Stacks a shared read-only image layer under a container-private
//! writable layer, giving each container a copy-on-write root.

use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result};
use nix::mount::{MntFlags, MsFlags};

use crate::sys_err;

/// Configuration for an `OverlayFS` mount.
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Read-only lower layers (top to bottom).
    pub lower_dirs: Vec<PathBuf>,
    /// Writable upper layer directory.
    pub upper_dir: PathBuf,
    /// Work directory required by `OverlayFS`.
    pub work_dir: PathBuf,
    /// Final merged mount point.
    pub merged_dir: PathBuf,
}

impl OverlayConfig {
    /// Renders the `lowerdir=...,upperdir=...,workdir=...` option string.
    #[must_use]
    pub fn mount_options(&self) -> String {
        let lowers = self
            .lower_dirs
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":");
        format!(
            "lowerdir={},upperdir={},workdir={}",
            lowers,
            self.upper_dir.display(),
            self.work_dir.display()
        )
    }
}

/// Mounts an `OverlayFS` with the given configuration.
///
/// Creates the upper, work, and merged directories if they do not exist,
/// then issues the `mount(2)` syscall with overlay-specific options.
///
/// # Errors
///
/// Returns an error if directory creation fails or if the mount syscall fails.
pub fn mount_overlay(config: &OverlayConfig) -> Result<()> {
    for dir in [&config.upper_dir, &config.work_dir, &config.merged_dir] {
        std::fs::create_dir_all(dir).map_err(|e| BurrowError::io(dir, e))?;
    }

    let opts = config.mount_options();
    nix::mount::mount(
        Some("overlay"),
        &config.merged_dir,
        Some("overlay"),
        MsFlags::empty(),
        Some(opts.as_str()),
    )
    .map_err(sys_err("overlay mount"))?;

    tracing::info!(merged = %config.merged_dir.display(), "overlayfs mounted");
    Ok(())
}

/// Unmounts an `OverlayFS` at the given path.
///
/// Uses `MNT_DETACH` to lazily detach the filesystem.
///
/// # Errors
///
/// Returns an error if the unmount syscall fails.
pub fn unmount_overlay(merged_dir: &Path) -> Result<()> {
    nix::mount::umount2(merged_dir, MntFlags::MNT_DETACH).map_err(sys_err("overlay unmount"))?;
    tracing::info!(path = %merged_dir.display(), "overlayfs unmounted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_options_list_every_layer() {
        let config = OverlayConfig {
            lower_dirs: vec!["/ro/busybox".into()],
            upper_dir: "/c/web/writeOnly".into(),
            work_dir: "/c/web/work".into(),
            merged_dir: "/c/web/mnt".into(),
        };
        assert_eq!(
            config.mount_options(),
            "lowerdir=/ro/busybox,upperdir=/c/web/writeOnly,workdir=/c/web/work"
        );
    }

    #[test]
    fn multiple_lowers_are_colon_joined() {
        let config = OverlayConfig {
            lower_dirs: vec!["/a".into(), "/b".into()],
            upper_dir: "/u".into(),
            work_dir: "/w".into(),
            merged_dir: "/m".into(),
        };
        assert!(config.mount_options().starts_with("lowerdir=/a:/b,"));
    }
}
