//! Per-container root filesystems.
//!
//! The image's shared read-only layer is stacked under a private
//! writable layer with `OverlayFS`, merged at `<container dir>/mnt`.
//! Volumes are host directories bind-mounted into the merged tree.

use std::path::{Component, Path, PathBuf};

use burrow_common::config::RuntimeConfig;
use burrow_common::error::{BurrowError, Result};
use burrow_core::filesystem::mount;
use burrow_core::filesystem::overlayfs::{self, OverlayConfig};
use burrow_image::storage::ImageStore;
use serde::{Deserialize, Serialize};

/// A host directory bound into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeBind {
    /// Directory on the host.
    pub host: PathBuf,
    /// Path inside the container, relative to its root.
    pub container: PathBuf,
}

impl VolumeBind {
    /// Parses `hostPath:containerPath`.
    ///
    /// Returns `None` unless the argument has exactly two non-empty parts
    /// and the container path names something below the root without
    /// any `..` component.
    #[must_use]
    pub fn parse(spec: &str) -> Option<Self> {
        let mut parts = spec.split(':');
        let (host, container) = (parts.next()?, parts.next()?);
        if parts.next().is_some() || host.is_empty() || container.is_empty() {
            return None;
        }
        let inside = Path::new(container);
        if inside.components().any(|c| c == Component::ParentDir)
            || !inside.components().any(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(Self {
            host: PathBuf::from(host),
            container: PathBuf::from(container),
        })
    }

    /// Where the volume appears on the host side of the merged root.
    ///
    /// Only the plain name components of the container path are used.
    #[must_use]
    pub fn target(&self, mount_root: &Path) -> PathBuf {
        let mut target = mount_root.to_path_buf();
        for component in self.container.components() {
            if let Component::Normal(part) = component {
                target.push(part);
            }
        }
        target
    }
}

/// The layers and mounts making up one container's root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Shared image content; never deleted here.
    pub read_only: PathBuf,
    /// Container-private upper layer.
    pub write_layer: PathBuf,
    /// Overlay bookkeeping directory.
    pub work_layer: PathBuf,
    /// Merged root handed to the container.
    pub mount_root: PathBuf,
    /// Volumes bound into the merged root.
    pub volumes: Vec<VolumeBind>,
}

impl Workspace {
    /// Describes the workspace of container `name` without touching disk.
    #[must_use]
    pub fn layout(config: &RuntimeConfig, read_only: PathBuf, name: &str) -> Self {
        Self {
            read_only,
            write_layer: config.write_layer(name),
            work_layer: config.work_layer(name),
            mount_root: config.mount_root(name),
            volumes: Vec::new(),
        }
    }

    /// Builds the merged root of container `name` from `image`, then
    /// binds each parsable volume spec into it.
    ///
    /// Unparsable volume specs are logged and skipped. If a bind mount
    /// fails, whatever was mounted is torn down again.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::Config`] if the image archive is missing, or
    /// the first unpack or mount error.
    pub fn build(
        config: &RuntimeConfig,
        images: &ImageStore,
        image: &str,
        name: &str,
        volume_specs: &[String],
    ) -> Result<Self> {
        let read_only = images.ensure_unpacked(image)?;
        let mut workspace = Self::layout(config, read_only, name);
        if let Err(e) = overlayfs::mount_overlay(&workspace.overlay()) {
            workspace.teardown();
            return Err(e);
        }

        for spec in volume_specs {
            let Some(volume) = VolumeBind::parse(spec) else {
                tracing::warn!(volume = %spec, "skipping malformed volume spec");
                continue;
            };
            if let Err(e) = bind_volume(&workspace.mount_root, &volume) {
                workspace.teardown();
                return Err(e);
            }
            workspace.volumes.push(volume);
        }

        tracing::info!(name, image, root = %workspace.mount_root.display(), "workspace built");
        Ok(workspace)
    }

    /// Unmounts volumes and the overlay, then deletes the private layers.
    ///
    /// Every step is attempted; failures are logged. The merged mount
    /// point is only removed if it is empty, so a mount that refused to
    /// go away never has its contents deleted.
    pub fn teardown(&self) {
        for volume in self.volumes.iter().rev() {
            let target = volume.target(&self.mount_root);
            if let Err(e) = mount::unmount(&target, true) {
                tracing::warn!(target = %target.display(), error = %e, "volume unmount failed");
            }
        }
        if let Err(e) = overlayfs::unmount_overlay(&self.mount_root) {
            tracing::warn!(root = %self.mount_root.display(), error = %e, "overlay unmount failed");
        }

        for dir in [&self.write_layer, &self.work_layer] {
            if dir.exists() {
                if let Err(e) = std::fs::remove_dir_all(dir) {
                    tracing::warn!(path = %dir.display(), error = %e, "layer removal failed");
                }
            }
        }
        if self.mount_root.exists() {
            if let Err(e) = std::fs::remove_dir(&self.mount_root) {
                tracing::warn!(
                    path = %self.mount_root.display(),
                    error = %e,
                    "mount point removal failed"
                );
            }
        }
        tracing::info!(root = %self.mount_root.display(), "workspace torn down");
    }

    fn overlay(&self) -> OverlayConfig {
        OverlayConfig {
            lower_dirs: vec![self.read_only.clone()],
            upper_dir: self.write_layer.clone(),
            work_dir: self.work_layer.clone(),
            merged_dir: self.mount_root.clone(),
        }
    }
}

fn bind_volume(mount_root: &Path, volume: &VolumeBind) -> Result<()> {
    let target = volume.target(mount_root);
    for dir in [&volume.host, &target] {
        std::fs::create_dir_all(dir).map_err(|e| BurrowError::io(dir, e))?;
    }
    ensure_inside(mount_root, &target)?;
    mount::bind_mount(&volume.host, &target)
}

/// Fails unless `target`, with symlinks resolved, lies below `mount_root`.
fn ensure_inside(mount_root: &Path, target: &Path) -> Result<()> {
    let root = mount_root
        .canonicalize()
        .map_err(|e| BurrowError::io(mount_root, e))?;
    let resolved = target.canonicalize().map_err(|e| BurrowError::io(target, e))?;
    if resolved == root || !resolved.starts_with(&root) {
        return Err(BurrowError::config(format!(
            "volume target {} resolves outside the container root",
            target.display()
        )));
    }
    Ok(())
}
