//! Local image store.
//!
//! Maps an image name to its packed archive under `<root>/images` and to
//! its shared read-only layer under `<root>/readOnly`.

use std::path::{Path, PathBuf};

use burrow_common::config::RuntimeConfig;
use burrow_common::error::{BurrowError, Result};

use crate::layer;

/// Archive suffixes looked up for an image, in order of preference.
const ARCHIVE_SUFFIXES: [&str; 3] = [".tar", ".tar.gz", ".tgz"];

/// Suffix of the scratch directory used while unpacking.
const PARTIAL_SUFFIX: &str = ".partial";

/// Manages packed images and their unpacked read-only layers.
#[derive(Debug, Clone)]
pub struct ImageStore {
    images_dir: PathBuf,
    read_only_dir: PathBuf,
}

impl ImageStore {
    /// Creates a store over the directories of `config`.
    #[must_use]
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            images_dir: config.images_dir(),
            read_only_dir: config.read_only_dir(),
        }
    }

    /// Finds the packed archive of `image`.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::Config`] if the image name is not a plain
    /// file name or no archive exists for it.
    pub fn archive_path(&self, image: &str) -> Result<PathBuf> {
        validate_name(image)?;
        ARCHIVE_SUFFIXES
            .iter()
            .map(|suffix| self.images_dir.join(format!("{image}{suffix}")))
            .find(|path| path.is_file())
            .ok_or_else(|| {
                BurrowError::config(format!(
                    "image {image} has no archive in {}",
                    self.images_dir.display()
                ))
            })
    }

    /// Directory holding the unpacked content of `image`.
    #[must_use]
    pub fn layer_path(&self, image: &str) -> PathBuf {
        self.read_only_dir.join(image)
    }

    /// Returns the read-only layer of `image`, unpacking its archive on
    /// first use.
    ///
    /// The archive is unpacked into a scratch directory that is renamed
    /// into place once complete, so an interrupted unpack is redone
    /// rather than reused.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive is missing or cannot be unpacked.
    pub fn ensure_unpacked(&self, image: &str) -> Result<PathBuf> {
        let archive = self.archive_path(image)?;
        let target = self.layer_path(image);
        if target.is_dir() {
            tracing::debug!(image, layer = %target.display(), "reusing read-only layer");
            return Ok(target);
        }

        let scratch = self.read_only_dir.join(format!("{image}{PARTIAL_SUFFIX}"));
        if scratch.exists() {
            std::fs::remove_dir_all(&scratch).map_err(|e| BurrowError::io(&scratch, e))?;
        }
        let _ = layer::extract_layer(&archive, &scratch)?;
        std::fs::rename(&scratch, &target).map_err(|e| BurrowError::io(&target, e))?;

        tracing::info!(image, layer = %target.display(), "image unpacked");
        Ok(target)
    }

    /// Names of every image with a packed archive, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the images directory exists but cannot be read.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.images_dir.exists() {
            return Ok(Vec::new());
        }
        let entries =
            std::fs::read_dir(&self.images_dir).map_err(|e| BurrowError::io(&self.images_dir, e))?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                let file_name = entry.file_name().to_string_lossy().into_owned();
                ARCHIVE_SUFFIXES
                    .iter()
                    .find_map(|suffix| file_name.strip_suffix(suffix).map(str::to_string))
            })
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Returns the directory holding packed archives.
    #[must_use]
    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }
}

fn validate_name(image: &str) -> Result<()> {
    if image.is_empty() || image.contains('/') || image == "." || image == ".." {
        return Err(BurrowError::config(format!("invalid image name: {image:?}")));
    }
    Ok(())
}
