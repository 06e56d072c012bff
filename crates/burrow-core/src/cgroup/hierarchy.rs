//! Locating cgroup v1 controller mount points.
//!
//! Each v1 controller is mounted on its own hierarchy; the mount table
//! tells us where. A `/proc/self/mountinfo` line looks like
//!
//! ```text
//! 30 25 0:26 / /sys/fs/cgroup/cpu,cpuacct rw,nosuid - cgroup cgroup rw,cpu,cpuacct
//! ```
//!
//! The mount point is the fifth field; the controllers appear in the
//! super options after the ` - ` separator.

use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result};

const SEPARATOR: &str = " - ";

/// Finds the mount point of the hierarchy carrying `controller`.
///
/// # Errors
///
/// Returns [`BurrowError::Io`] if the mount table cannot be read and
/// [`BurrowError::Config`] if no hierarchy carries the controller.
pub fn controller_root(mountinfo: &Path, controller: &str) -> Result<PathBuf> {
    let table =
        std::fs::read_to_string(mountinfo).map_err(|e| BurrowError::io(mountinfo, e))?;

    table
        .lines()
        .find_map(|line| match_controller(line, controller))
        .ok_or_else(|| {
            BurrowError::config(format!(
                "cgroup controller {controller} is not mounted (scanned {})",
                mountinfo.display()
            ))
        })
}

fn match_controller(line: &str, controller: &str) -> Option<PathBuf> {
    let (mount_fields, fs_fields) = line.split_once(SEPARATOR)?;
    let mut fs_fields = fs_fields.split_whitespace();
    if fs_fields.next()? != "cgroup" {
        return None;
    }
    let super_options = fs_fields.nth(1)?;
    if !super_options.split(',').any(|opt| opt == controller) {
        return None;
    }
    mount_fields.split_whitespace().nth(4).map(PathBuf::from)
}
