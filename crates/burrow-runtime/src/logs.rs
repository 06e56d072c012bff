//! Container log files.
//!
//! A detached container's stdout and stderr both go to
//! `<root>/container/<name>/container.log`.

use std::fs::File;
use std::path::Path;

use burrow_common::error::{BurrowError, Result};

/// Opens the log for appending, creating it and its directory if needed.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created.
pub fn open_log(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BurrowError::io(parent, e))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| BurrowError::io(path, e))
}

/// Empties the log before a restart.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be truncated.
pub fn truncate_log(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    File::create(path)
        .map(drop)
        .map_err(|e| BurrowError::io(path, e))
}

/// Reads the whole log.
///
/// Returns an empty string if the log file does not exist yet.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_logs(path: &Path) -> Result<String> {
    if !path.exists() {
        return Ok(String::new());
    }
    let bytes = std::fs::read(path).map_err(|e| BurrowError::io(path, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn read_logs_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_logs(&dir.path().join("container.log")).unwrap().is_empty());
    }

    #[test]
    fn open_log_creates_directory_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web").join("container.log");
        writeln!(open_log(&path).unwrap(), "line one").unwrap();
        writeln!(open_log(&path).unwrap(), "line two").unwrap();
        assert_eq!(read_logs(&path).unwrap(), "line one\nline two\n");
    }

    #[test]
    fn truncate_empties_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("container.log");
        std::fs::write(&path, "old output\n").unwrap();
        truncate_log(&path).unwrap();
        assert!(read_logs(&path).unwrap().is_empty());
        truncate_log(&dir.path().join("absent.log")).unwrap();
    }

    #[test]
    fn non_utf8_output_is_read_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("container.log");
        std::fs::write(&path, [b'o', b'k', 0xff, b'\n']).unwrap();
        assert!(read_logs(&path).unwrap().starts_with("ok"));
    }
}
