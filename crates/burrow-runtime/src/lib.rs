//! Container lifecycle management for the Burrow runtime.
//!
//! [`engine::Engine`] is the entry point: it builds a container's
//! workspace, launches its init process through the two-half protocol in
//! [`process`] and [`init`], applies cgroup limits and networking before
//! releasing the child, and keeps the persisted [`container::ContainerRecord`]
//! current across start, stop, restart, and removal.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod container;
pub mod engine;
pub mod exec;
pub mod init;
pub mod logs;
pub mod process;
pub mod state;
pub mod workspace;
