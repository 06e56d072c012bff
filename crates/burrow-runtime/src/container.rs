//! The container request and the persisted container record.

use std::fmt;

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{ContainerId, ContainerStatus, ResourceLimits};
use burrow_core::cgroup::CgroupManager;
use burrow_network::Endpoint;
use serde::{Deserialize, Serialize};

use crate::workspace::Workspace;

/// Longest accepted container name.
const MAX_NAME_LEN: usize = 64;

/// Everything needed to create and run a new container.
#[derive(Debug, Clone, Default)]
pub struct ContainerConfig {
    /// Container name; the generated id is used when absent.
    pub name: Option<String>,
    /// Image whose archive provides the root filesystem.
    pub image: String,
    /// Command line to execute inside the container.
    pub command: Vec<String>,
    /// Extra `KEY=VALUE` environment entries.
    pub env: Vec<String>,
    /// `hostPath:containerPath` volume specs.
    pub volumes: Vec<String>,
    /// `hostPort:containerPort` port mappings.
    pub port_mapping: Vec<String>,
    /// Network to connect to, if any.
    pub network: Option<String>,
    /// Resource limits for the cgroup.
    pub limits: ResourceLimits,
    /// Keep stdio attached and wait for the workload to exit.
    pub attached: bool,
}

impl ContainerConfig {
    /// Checks the request before anything is created.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::Config`] for an empty command or image,
    /// malformed environment entries, or port mappings without a network.
    pub fn validate(&self) -> Result<()> {
        if self.command.is_empty() {
            return Err(BurrowError::config("missing container command"));
        }
        if self.image.is_empty() {
            return Err(BurrowError::config("missing image name"));
        }
        if let Some(bad) = self.env.iter().find(|e| !e.contains('=')) {
            return Err(BurrowError::config(format!(
                "environment entry {bad:?} is not KEY=VALUE"
            )));
        }
        if self.network.is_none() && !self.port_mapping.is_empty() {
            return Err(BurrowError::config("port mappings require a network"));
        }
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        Ok(())
    }
}

/// Checks that `name` can key a directory, a cgroup, and a network
/// namespace.
///
/// # Errors
///
/// Returns [`BurrowError::Config`] if it cannot.
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(BurrowError::config(format!(
            "invalid container name {name:?}: use letters, digits, '-', '_' or '.'"
        )))
    }
}

/// Persisted state of one container.
///
/// Workspace, cgroup, and endpoint are snapshots taken once each was set
/// up; the record is rewritten whole on every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Random short identifier.
    pub id: ContainerId,
    /// Unique name keying every per-container resource.
    pub name: String,
    /// Host pid of the init process; kept after the process is gone.
    pub pid: u32,
    /// Command line executed inside the container.
    pub command: Vec<String>,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// Lifecycle status.
    pub status: ContainerStatus,
    /// Image the root filesystem came from.
    pub image: String,
    /// Declared volume specs.
    pub volumes: Vec<String>,
    /// Declared port mappings.
    pub port_mapping: Vec<String>,
    /// Extra environment entries.
    pub env: Vec<String>,
    /// Network attachment, if networked.
    pub network: Option<Endpoint>,
    /// Cgroup descriptor.
    pub cgroup: CgroupManager,
    /// Workspace descriptor.
    pub workspace: Workspace,
}

impl ContainerRecord {
    /// Name of the container's network namespace, if it has one.
    #[must_use]
    pub fn netns_name(&self) -> Option<&str> {
        self.network.as_ref().map(|_| self.name.as_str())
    }

    /// Returns `true` if the record says the container is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == ContainerStatus::Running
    }
}

impl fmt::Display for ContainerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.id, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ContainerConfig {
        ContainerConfig {
            image: "busybox".into(),
            command: vec!["sh".into()],
            ..ContainerConfig::default()
        }
    }

    #[test]
    fn minimal_request_is_valid() {
        request().validate().unwrap();
    }

    #[test]
    fn empty_command_is_rejected() {
        let cfg = ContainerConfig {
            command: Vec::new(),
            ..request()
        };
        assert!(matches!(cfg.validate(), Err(BurrowError::Config { .. })));
    }

    #[test]
    fn ports_without_network_are_rejected() {
        let cfg = ContainerConfig {
            port_mapping: vec!["8080:80".into()],
            ..request()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_entries_need_an_equals_sign() {
        let cfg = ContainerConfig {
            env: vec!["DEBUG".into()],
            ..request()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn names_must_be_path_safe() {
        validate_name("web-1.prod").unwrap();
        for bad in ["", "../etc", ".hidden", "a/b", "white space"] {
            assert!(validate_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}
