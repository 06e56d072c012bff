//! Runtime configuration and the on-disk layout derived from it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;

/// Root configuration for the Burrow runtime.
///
/// Every persisted path is derived from the root, so tests and
/// alternative installs only need to swap it. Named network namespaces
/// always live where `ip netns` keeps them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Base directory for containers, images, and networks.
    pub root: PathBuf,
    /// Mount table scanned for cgroup controller mount points.
    pub mountinfo: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::with_root(constants::DEFAULT_ROOT)
    }
}

impl RuntimeConfig {
    /// Creates a configuration rooted at `root` with host defaults for
    /// everything else.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mountinfo: PathBuf::from(constants::DEFAULT_MOUNTINFO),
        }
    }

    /// Directory holding every container's state.
    #[must_use]
    pub fn containers_dir(&self) -> PathBuf {
        self.root.join(constants::CONTAINER_DIR)
    }

    /// Directory holding one container's state.
    #[must_use]
    pub fn container_dir(&self, name: &str) -> PathBuf {
        self.containers_dir().join(name)
    }

    /// Path to a container's persisted record.
    #[must_use]
    pub fn record_path(&self, name: &str) -> PathBuf {
        self.container_dir(name).join(constants::RECORD_FILE)
    }

    /// Path to a container's log file.
    #[must_use]
    pub fn log_path(&self, name: &str) -> PathBuf {
        self.container_dir(name).join(constants::LOG_FILE)
    }

    /// Writable overlay layer of a container.
    #[must_use]
    pub fn write_layer(&self, name: &str) -> PathBuf {
        self.container_dir(name).join(constants::WRITE_LAYER_DIR)
    }

    /// Overlay work directory of a container.
    #[must_use]
    pub fn work_layer(&self, name: &str) -> PathBuf {
        self.container_dir(name).join(constants::WORK_LAYER_DIR)
    }

    /// Merged mount point of a container.
    #[must_use]
    pub fn mount_root(&self, name: &str) -> PathBuf {
        self.container_dir(name).join(constants::MOUNT_DIR)
    }

    /// Directory holding image archives.
    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.root.join(constants::IMAGES_DIR)
    }

    /// Directory holding shared read-only image layers.
    #[must_use]
    pub fn read_only_dir(&self) -> PathBuf {
        self.root.join(constants::READ_ONLY_DIR)
    }

    /// Directory holding persisted network records.
    #[must_use]
    pub fn network_dir(&self) -> PathBuf {
        self.root.join(constants::NETWORK_DIR)
    }

    /// Path to the IPAM bitmap store.
    #[must_use]
    pub fn ipam_path(&self) -> PathBuf {
        self.network_dir()
            .join(constants::IPAM_DIR)
            .join(constants::IPAM_FILE)
    }

    /// Path of the named network namespace `name`, as created by
    /// `ip netns add`.
    #[must_use]
    #[allow(clippy::unused_self)]
    pub fn netns_path(&self, name: &str) -> PathBuf {
        Path::new(constants::NETNS_DIR).join(name)
    }

    /// Returns the runtime root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_layout_is_keyed_by_name() {
        let cfg = RuntimeConfig::with_root("/srv/burrow");
        assert_eq!(
            cfg.record_path("web"),
            PathBuf::from("/srv/burrow/container/web/config.json")
        );
        assert_eq!(
            cfg.log_path("web"),
            PathBuf::from("/srv/burrow/container/web/container.log")
        );
        assert_eq!(
            cfg.mount_root("web"),
            PathBuf::from("/srv/burrow/container/web/mnt")
        );
        assert_eq!(
            cfg.write_layer("web"),
            PathBuf::from("/srv/burrow/container/web/writeOnly")
        );
    }

    #[test]
    fn network_layout_nests_ipam_store() {
        let cfg = RuntimeConfig::with_root("/srv/burrow");
        assert_eq!(
            cfg.ipam_path(),
            PathBuf::from("/srv/burrow/network/ipam/subnet.json")
        );
        assert_eq!(cfg.netns_path("web"), PathBuf::from("/var/run/netns/web"));
    }

    #[test]
    fn netns_path_ignores_runtime_root() {
        let a = RuntimeConfig::with_root("/srv/a");
        let b = RuntimeConfig::with_root("/srv/b");
        assert_eq!(a.netns_path("db"), b.netns_path("db"));
    }
}
