//! Persisted container records.
//!
//! Each container's record is a JSON file at
//! `<root>/container/<name>/config.json`; there is no central index and
//! no daemon, so every command reloads the records it needs.

use std::path::Path;

use burrow_common::config::RuntimeConfig;
use burrow_common::constants;
use burrow_common::error::{BurrowError, Result};

use crate::container::ContainerRecord;

/// Writes `record`, replacing any previous version.
///
/// The file is written next to its destination and renamed into place,
/// so readers never see a half-written record.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn save(config: &RuntimeConfig, record: &ContainerRecord) -> Result<()> {
    let dir = config.container_dir(&record.name);
    std::fs::create_dir_all(&dir).map_err(|e| BurrowError::io(&dir, e))?;

    let path = config.record_path(&record.name);
    let staging = dir.join(format!("{}.tmp", constants::RECORD_FILE));
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(&staging, json).map_err(|e| BurrowError::io(&staging, e))?;
    std::fs::rename(&staging, &path).map_err(|e| BurrowError::io(&path, e))?;
    tracing::debug!(name = %record.name, status = %record.status, "container record saved");
    Ok(())
}

/// Loads the record of container `name`.
///
/// # Errors
///
/// Returns [`BurrowError::NotFound`] if there is no record, or an error
/// if it cannot be read or parsed.
pub fn load(config: &RuntimeConfig, name: &str) -> Result<ContainerRecord> {
    let path = config.record_path(name);
    if !path.is_file() {
        return Err(BurrowError::NotFound {
            kind: "container",
            id: name.to_string(),
        });
    }
    read_record(&path)
}

/// Returns `true` if a record exists for `name`.
#[must_use]
pub fn exists(config: &RuntimeConfig, name: &str) -> bool {
    config.record_path(name).is_file()
}

/// Deletes the record and log of container `name`, then its directory
/// if nothing else is left in it.
///
/// # Errors
///
/// Returns an error if the record file cannot be deleted.
pub fn delete(config: &RuntimeConfig, name: &str) -> Result<()> {
    let record = config.record_path(name);
    if record.exists() {
        std::fs::remove_file(&record).map_err(|e| BurrowError::io(&record, e))?;
    }
    let log = config.log_path(name);
    if log.exists() {
        if let Err(e) = std::fs::remove_file(&log) {
            tracing::warn!(path = %log.display(), error = %e, "log removal failed");
        }
    }
    let dir = config.container_dir(name);
    if dir.exists() {
        if let Err(e) = std::fs::remove_dir(&dir) {
            tracing::warn!(path = %dir.display(), error = %e, "container directory left behind");
        }
    }
    tracing::debug!(name, "container record deleted");
    Ok(())
}

/// Loads every record, sorted by creation time.
///
/// Directories without a record file are skipped.
///
/// # Errors
///
/// Returns an error if the containers directory or a record cannot be
/// read.
pub fn list(config: &RuntimeConfig) -> Result<Vec<ContainerRecord>> {
    let dir = config.containers_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for entry in std::fs::read_dir(&dir).map_err(|e| BurrowError::io(&dir, e))? {
        let path = entry
            .map_err(|e| BurrowError::io(&dir, e))?
            .path()
            .join(constants::RECORD_FILE);
        if path.is_file() {
            records.push(read_record(&path)?);
        }
    }
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
    Ok(records)
}

fn read_record(path: &Path) -> Result<ContainerRecord> {
    let raw = std::fs::read_to_string(path).map_err(|e| BurrowError::io(path, e))?;
    Ok(serde_json::from_str(&raw)?)
}
