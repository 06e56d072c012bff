//! Unpacking image archives into layer directories.

use std::path::Path;

use burrow_common::error::{BurrowError, Result};

/// Summary of an unpacked layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    /// Size of the source archive in bytes.
    pub size_bytes: u64,
    /// Number of entries written into the target directory.
    pub entries: usize,
}

/// Extracts a tar archive into `target`.
///
/// Supports both plain `.tar` and gzip-compressed `.tar.gz` / `.tgz`
/// archives. Permissions are preserved so the result is
/// usable as a container root.
///
/// # Errors
///
/// Returns an error if the archive cannot be read or an entry cannot be
/// written.
pub fn extract_layer(archive_path: &Path, target: &Path) -> Result<Layer> {
    tracing::info!(
        archive = %archive_path.display(),
        target = %target.display(),
        "extracting layer"
    );

    std::fs::create_dir_all(target).map_err(|e| BurrowError::io(target, e))?;
    let file = std::fs::File::open(archive_path).map_err(|e| BurrowError::io(archive_path, e))?;
    let size_bytes = file
        .metadata()
        .map_err(|e| BurrowError::io(archive_path, e))?
        .len();

    let entries = if is_gzip_archive(archive_path) {
        unpack(tar::Archive::new(flate2::read::GzDecoder::new(file)), target)?
    } else {
        unpack(tar::Archive::new(file), target)?
    };

    tracing::info!(size = size_bytes, entries, "layer extracted");
    Ok(Layer {
        size_bytes,
        entries,
    })
}

fn unpack<R: std::io::Read>(mut archive: tar::Archive<R>, target: &Path) -> Result<usize> {
    archive.set_preserve_permissions(true);

    let mut count = 0;
    for entry in archive.entries().map_err(|e| BurrowError::io(target, e))? {
        let mut entry = entry.map_err(|e| BurrowError::io(target, e))?;
        if entry
            .unpack_in(target)
            .map_err(|e| BurrowError::io(target, e))?
        {
            count += 1;
        }
    }
    Ok(count)
}

/// Determines whether the archive is gzip-compressed based on extension.
fn is_gzip_archive(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz") || ext.eq_ignore_ascii_case("tgz"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append_file<W: std::io::Write>(builder: &mut tar::Builder<W>, name: &str, data: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data).unwrap();
    }

    #[test]
    fn extract_plain_tar_writes_entries() {
        let dir = tempfile::tempdir().unwrap();
        let tar_path = dir.path().join("busybox.tar");
        let mut builder = tar::Builder::new(std::fs::File::create(&tar_path).unwrap());
        append_file(&mut builder, "bin/sh", b"#!fake shell");
        append_file(&mut builder, "etc/hostname", b"burrow");
        builder.finish().unwrap();

        let target = dir.path().join("layer");
        let layer = extract_layer(&tar_path, &target).unwrap();
        assert_eq!(layer.entries, 2);
        assert!(layer.size_bytes > 0);
        assert_eq!(
            std::fs::read_to_string(target.join("etc/hostname")).unwrap(),
            "burrow"
        );
    }

    #[test]
    fn extract_gzip_tar_writes_entries() {
        let dir = tempfile::tempdir().unwrap();
        let tar_path = dir.path().join("alpine.tar.gz");
        let encoder = flate2::write::GzEncoder::new(
            std::fs::File::create(&tar_path).unwrap(),
            flate2::Compression::default(),
        );
        let mut builder = tar::Builder::new(encoder);
        append_file(&mut builder, "etc/os-release", b"ID=alpine");
        let _ = builder.into_inner().unwrap().finish().unwrap();

        let target = dir.path().join("layer");
        let _ = extract_layer(&tar_path, &target).unwrap();
        assert_eq!(
            std::fs::read_to_string(target.join("etc/os-release")).unwrap(),
            "ID=alpine"
        );
    }

    #[test]
    fn extract_missing_archive_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_layer(&dir.path().join("missing.tar"), &dir.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, BurrowError::Io { .. }));
    }

    #[test]
    fn gzip_detection_uses_extension() {
        assert!(is_gzip_archive(Path::new("layer.tar.gz")));
        assert!(is_gzip_archive(Path::new("layer.tgz")));
        assert!(!is_gzip_archive(Path::new("layer.tar")));
    }
}
