//! Cgroup v1 resource management.
//!
//! A container gets one directory per controller, named after the
//! container, under that controller's host mount point. Controllers with
//! no configured limit are still created but stay inert: nothing is
//! written to them and the process is not attached to them.

pub mod cpu;
pub mod cpuset;
pub mod hierarchy;
pub mod memory;

use std::fmt;
use std::path::{Path, PathBuf};

use burrow_common::constants;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::ResourceLimits;
use serde::{Deserialize, Serialize};

/// File listing the member pids of a v1 cgroup.
const TASKS_FILE: &str = "tasks";

/// The controllers Burrow manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    /// CPU share weighting.
    Cpu,
    /// CPU pinning.
    Cpuset,
    /// Memory ceiling.
    Memory,
}

impl Subsystem {
    /// Every managed controller, in setup order.
    pub const ALL: [Self; 3] = [Self::Cpu, Self::Cpuset, Self::Memory];

    /// Controller name as it appears in the mount table.
    #[must_use]
    pub const fn controller(self) -> &'static str {
        match self {
            Self::Cpu => cpu::CONTROLLER,
            Self::Cpuset => cpuset::CONTROLLER,
            Self::Memory => memory::CONTROLLER,
        }
    }

    /// Limit file written when the controller is active.
    #[must_use]
    pub const fn limit_file(self) -> &'static str {
        match self {
            Self::Cpu => cpu::LIMIT_FILE,
            Self::Cpuset => cpuset::LIMIT_FILE,
            Self::Memory => memory::LIMIT_FILE,
        }
    }

    /// Value for the limit file, or `None` if the limit is unset.
    #[must_use]
    pub fn limit_value(self, limits: &ResourceLimits) -> Option<String> {
        match self {
            Self::Cpu => cpu::limit_value(limits),
            Self::Cpuset => cpuset::limit_value(limits),
            Self::Memory => memory::limit_value(limits),
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.controller())
    }
}

/// One controller directory created for a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controller {
    /// Which controller this is.
    pub subsystem: Subsystem,
    /// The container's directory under the controller mount point.
    pub path: PathBuf,
    /// Whether a limit was written and the process should be attached.
    pub active: bool,
}

/// Handle to the cgroups of one container.
///
/// Serializes into the container record, so a restarted container can be
/// re-attached without rescanning the mount table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CgroupManager {
    /// Group name, equal to the container name.
    pub name: String,
    /// Limits the controllers were configured with.
    pub limits: ResourceLimits,
    /// Controller directories created by [`CgroupManager::configure`].
    pub controllers: Vec<Controller>,
    #[serde(skip, default = "default_mountinfo")]
    mountinfo: PathBuf,
}

fn default_mountinfo() -> PathBuf {
    PathBuf::from(constants::DEFAULT_MOUNTINFO)
}

impl CgroupManager {
    /// Creates an unconfigured manager for the group `name`, locating
    /// controllers through the mount table at `mountinfo`.
    #[must_use]
    pub fn new(name: impl Into<String>, mountinfo: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            limits: ResourceLimits::default(),
            controllers: Vec::new(),
            mountinfo: mountinfo.into(),
        }
    }

    /// Creates the group under every controller and writes the limits
    /// that are set.
    ///
    /// Calling it again with the same limits is harmless: directories are
    /// reused and the controller list is rebuilt, not appended to.
    ///
    /// # Errors
    ///
    /// Returns an error if a controller is not mounted or a directory or
    /// limit file cannot be written.
    pub fn configure(&mut self, limits: &ResourceLimits) -> Result<()> {
        let mut controllers = Vec::with_capacity(Subsystem::ALL.len());
        for subsystem in Subsystem::ALL {
            let root = hierarchy::controller_root(&self.mountinfo, subsystem.controller())?;
            let path = root.join(&self.name);
            std::fs::create_dir_all(&path).map_err(|e| BurrowError::io(&path, e))?;

            let active = match subsystem.limit_value(limits) {
                Some(value) => {
                    let file = path.join(subsystem.limit_file());
                    std::fs::write(&file, &value).map_err(|e| BurrowError::io(&file, e))?;
                    tracing::debug!(%subsystem, value, "cgroup limit written");
                    true
                }
                None => false,
            };
            controllers.push(Controller {
                subsystem,
                path,
                active,
            });
        }

        self.controllers = controllers;
        self.limits = limits.clone();
        tracing::info!(name = %self.name, "cgroup configured");
        Ok(())
    }

    /// Adds `pid` to every active controller.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::Config`] if called before
    /// [`CgroupManager::configure`], or an I/O error if a `tasks` file
    /// cannot be written.
    pub fn attach(&self, pid: u32) -> Result<()> {
        if self.controllers.is_empty() {
            return Err(BurrowError::config(format!(
                "cgroup {} must be configured before attaching pid {pid}",
                self.name
            )));
        }

        for controller in self.controllers.iter().filter(|c| c.active) {
            let tasks = controller.path.join(TASKS_FILE);
            std::fs::write(&tasks, pid.to_string()).map_err(|e| BurrowError::io(&tasks, e))?;
            tracing::debug!(subsystem = %controller.subsystem, pid, "added process to cgroup");
        }
        Ok(())
    }

    /// Removes every controller directory, active or not.
    ///
    /// All directories are attempted even if one fails.
    ///
    /// # Errors
    ///
    /// Returns the first removal error encountered.
    pub fn release(&self) -> Result<()> {
        let mut first_err = None;
        for controller in &self.controllers {
            if let Err(e) = remove_group_dir(&controller.path) {
                tracing::warn!(path = %controller.path.display(), error = %e, "cgroup removal failed");
                let _ = first_err.get_or_insert(e);
            }
        }
        tracing::info!(name = %self.name, "cgroup released");
        first_err.map_or(Ok(()), Err)
    }

    /// Returns `true` once [`CgroupManager::configure`] has run.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.controllers.is_empty()
    }
}

/// Deletes a group directory.
///
/// On cgroupfs the control files cannot be unlinked, but `rmdir` on the
/// directory succeeds once it has no members; ordinary directories fall
/// back to a recursive delete.
fn remove_group_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    if std::fs::remove_dir(path).is_ok() {
        return Ok(());
    }
    std::fs::remove_dir_all(path).map_err(|e| BurrowError::io(path, e))
}
