//! # burrow-network
//!
//! Bridge networking for Burrow containers.
//!
//! - **IPAM**: per-subnet address bitmaps persisted as JSON.
//! - **Networks**: a named subnet bound to a bridge device, kept in an
//!   explicit [`NetworkRegistry`] loaded from disk.
//! - **Endpoints**: a veth pair joining the bridge to a container's named
//!   network namespace, plus the DNAT rules of its port mappings.
//!
//! Links and rules are managed through the host's `ip` and `iptables`
//! tools, located on `PATH` before each use.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod bridge;
pub mod driver;
pub mod endpoint;
pub mod firewall;
pub mod ipam;
pub mod network;

pub use driver::NetworkDriver;
pub use endpoint::Endpoint;
pub use network::{NetnsTarget, Network, NetworkRegistry};

use burrow_common::command;
use burrow_common::error::Result;

/// Runs `ip` with `args`.
pub(crate) fn ip(args: &[&str]) -> Result<String> {
    command::run_tool("ip", args)
}
