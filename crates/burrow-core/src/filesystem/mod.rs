//! Filesystem management for container isolation.
//!
//! Provides `OverlayFS` assembly, bind mounts, the pseudo-filesystems the
//! init process needs, and the `pivot_root` switch.

pub mod mount;
pub mod overlayfs;
pub mod pivot_root;
