//! Linux namespace management for container isolation.
//!
//! A container's init is cloned into fresh UTS, PID, mount, network, and
//! IPC namespaces. Networking is then wired through a *named* network
//! namespace that init joins before exec, so the host can configure it
//! from the outside.

pub mod network;
pub mod uts;

use nix::sched::CloneFlags;

/// Which namespaces a new container init is cloned into.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Isolate UTS (hostname) namespace.
    pub uts: bool,
    /// Isolate PID namespace.
    pub pid: bool,
    /// Isolate mount namespace.
    pub mount: bool,
    /// Isolate network namespace.
    pub network: bool,
    /// Isolate IPC namespace.
    pub ipc: bool,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            uts: true,
            pid: true,
            mount: true,
            network: true,
            ipc: true,
        }
    }
}

impl NamespaceConfig {
    /// Flags to pass to `clone(2)`.
    #[must_use]
    pub fn clone_flags(&self) -> CloneFlags {
        [
            (self.uts, CloneFlags::CLONE_NEWUTS),
            (self.pid, CloneFlags::CLONE_NEWPID),
            (self.mount, CloneFlags::CLONE_NEWNS),
            (self.network, CloneFlags::CLONE_NEWNET),
            (self.ipc, CloneFlags::CLONE_NEWIPC),
        ]
        .into_iter()
        .filter(|(on, _)| *on)
        .fold(CloneFlags::empty(), |acc, (_, flag)| acc | flag)
    }
}
