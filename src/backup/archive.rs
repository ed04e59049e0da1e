// mongobackup/src/backup/archive.rs
use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::Path;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::errors::{AppError, Result};

/// File extensions mongodump writes per collection. An archive containing at
/// least one entry with either extension passes the structural check.
pub const DATA_FILE_EXT: &str = ".bson";
pub const METADATA_FILE_EXT: &str = ".metadata.json";

/// Creates a ZIP archive from a directory tree. Paths inside the archive are
/// relative to `source_dir`. Returns the archive size in bytes.
pub fn create_zip_archive(source_dir: &Path, archive_dest_path: &Path) -> Result<u64> {
    if !source_dir.is_dir() {
        return Err(io::Error::other(format!(
            "source for archival is not a directory: {}",
            source_dir.display()
        ))
        .into());
    }

    let archive_file = File::create(archive_dest_path)?;
    let mut writer = ZipWriter::new(archive_file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(source_dir) {
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();
        let relative = path
            .strip_prefix(source_dir)
            .map_err(|e| io::Error::other(e.to_string()))?;
        if relative.as_os_str().is_empty() {
            // The root directory itself.
            continue;
        }

        // ZIP entry names always use forward slashes.
        let name = relative.to_string_lossy().replace('\\', "/");
        if path.is_dir() {
            writer.add_directory(name, options)?;
        } else if path.is_file() {
            writer.start_file(name, options)?;
            let mut file = File::open(path)?;
            io::copy(&mut file, &mut writer)?;
        }
    }

    writer.finish()?;
    Ok(std::fs::metadata(archive_dest_path)?.len())
}

/// Opens a ZIP archive, mapping malformed input to `InvalidArchive`.
pub fn open_zip_archive(archive_path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(archive_path)?;
    ZipArchive::new(file).map_err(|e| AppError::InvalidArchive(e.to_string()))
}

/// Structural signature check: does the archive contain at least one file
/// mongodump would have produced? This validates the file listing only, not
/// the payload.
pub fn has_backup_signature<R: Read + Seek>(archive: &mut ZipArchive<R>) -> bool {
    (0..archive.len()).any(|i| {
        archive
            .by_index(i)
            .map(|entry| is_backup_data_file(entry.name()))
            .unwrap_or(false)
    })
}

fn is_backup_data_file(name: &str) -> bool {
    name.ends_with(DATA_FILE_EXT) || name.ends_with(METADATA_FILE_EXT)
}

/// Extracts every entry into `dest_dir`, rejecting entries whose paths would
/// escape it.
pub fn extract_zip_archive<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    dest_dir: &Path,
) -> Result<()> {
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            return Err(AppError::InvalidArchive(format!(
                "unsafe entry path: {}",
                entry.name()
            )));
        };
        let out_path = dest_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out_file = File::create(&out_path)?;
            io::copy(&mut entry, &mut out_file)?;
        }
    }
    Ok(())
}
