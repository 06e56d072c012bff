//! UTS namespace isolation.
//!
//! Allows the container to have its own hostname.

use burrow_common::error::Result;

use crate::sys_err;

/// Sets the hostname inside the calling process's UTS namespace.
///
/// # Errors
///
/// Returns an error if `sethostname(2)` fails.
pub fn set_hostname(hostname: &str) -> Result<()> {
    tracing::debug!(hostname, "setting container hostname");
    nix::unistd::sethostname(hostname).map_err(sys_err("sethostname"))
}
