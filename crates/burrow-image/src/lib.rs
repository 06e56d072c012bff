//! # burrow-image
//!
//! Image handling for the Burrow runtime.
//!
//! An image is a packed root filesystem at `<root>/images/<name>.tar`
//! (optionally gzip-compressed). The first container that uses it unpacks
//! it into `<root>/readOnly/<name>`, which later containers of the same
//! image reuse as their overlay lower layer.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod layer;
pub mod storage;
