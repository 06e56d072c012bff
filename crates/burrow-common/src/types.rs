//! Domain primitive types used across the Burrow workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Returns `len` random lowercase hex characters.
#[must_use]
pub fn random_hex(len: usize) -> String {
    let mut out = String::with_capacity(len);
    while out.len() < len {
        out.push_str(&uuid::Uuid::new_v4().simple().to_string());
    }
    out.truncate(len);
    out
}

/// Short random identifier of a container instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random container ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(random_hex(crate::constants::CONTAINER_ID_LEN))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resource limits for a container.
///
/// A zero or empty field leaves the matching controller inert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU shares (relative weight).
    pub cpu_shares: u64,
    /// CPU list the container may run on, e.g. `0-1`.
    pub cpuset_cpus: String,
    /// Memory ceiling as accepted by the kernel, e.g. `100m`.
    pub memory_limit: String,
}

impl ResourceLimits {
    /// Returns `true` if no limit is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cpu_shares == 0 && self.cpuset_cpus.is_empty() && self.memory_limit.is_empty()
    }
}

/// Lifecycle status of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// Container is actively running.
    Running,
    /// Container has been stopped on request.
    Stopped,
    /// Container's init process went away on its own.
    Exited,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Exited => write!(f, "exited"),
        }
    }
}
