// mongobackup/src/restore/logic.rs
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;

use crate::backup::archive;
use crate::errors::{AppError, Result};
use crate::restore::mongorestore;

/// Drives one restore: validate the upload, extract it into a per-attempt
/// staging directory, locate the dump inside it, and run mongorestore against
/// the target database.
///
/// The staging directory is a `TempDir`, so it is removed on every exit
/// path: success, tool failure, or an error mid-extraction.
pub async fn run_restore(
    uri: &str,
    mongorestore: &Path,
    archive_path: &Path,
    target_db: &str,
    mut on_line: impl FnMut(&str),
) -> Result<()> {
    let staging = TempDir::new()?;
    info!(staging = %staging.path().display(), "staging directory created");

    let (upload, dest) = (archive_path.to_path_buf(), staging.path().to_path_buf());
    tokio::task::spawn_blocking(move || stage_archive(&upload, &dest))
        .await
        .map_err(io::Error::other)??;

    // A bulk backup stages one directory per database; every one of them is
    // a restore source, not just the first.
    let dump_dirs = locate_backup_dirs(staging.path())?;
    if dump_dirs.len() > 1 {
        on_line(&format!(
            "archive contains {} database dumps; restoring each into '{}'",
            dump_dirs.len(),
            target_db
        ));
    }
    for dump_dir in &dump_dirs {
        info!(target = %target_db, dump = %dump_dir.display(), "running mongorestore");
        mongorestore::restore_directory(mongorestore, uri, target_db, dump_dir, &mut on_line)
            .await?;
    }

    info!(target = %target_db, "restore completed");
    Ok(())
}

/// Validates the upload (well-formed ZIP, mongodump structural signature) and
/// extracts it into `staging_dir`.
fn stage_archive(archive_path: &Path, staging_dir: &Path) -> Result<()> {
    let mut archive = archive::open_zip_archive(archive_path)?;
    if !archive::has_backup_signature(&mut archive) {
        return Err(AppError::UnrecognizedBackupFormat);
    }
    archive::extract_zip_archive(&mut archive, staging_dir)
}

/// Finds the top-level backup directories in the staging area, ignoring
/// platform-generated metadata entries. mongodump writes one directory per
/// database, so a multi-database archive yields several, in name order.
fn locate_backup_dirs(staging_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(staging_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || name == "__MACOSX" {
            continue;
        }
        dirs.push(entry.path());
    }
    dirs.sort();
    if dirs.is_empty() {
        return Err(AppError::EmptyArchive);
    }
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use zip::ZipWriter;
    use zip::write::FileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        for (name, data) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_stage_archive_extracts_valid_backup() -> Result<()> {
        let workdir = TempDir::new()?;
        let archive_path = workdir.path().join("upload.zip");
        write_zip(
            &archive_path,
            &[
                ("shop/orders.bson", b"\x05\x00\x00\x00\x00"),
                ("shop/orders.metadata.json", b"{}"),
            ],
        );

        let staging = TempDir::new()?;
        stage_archive(&archive_path, staging.path())?;
        assert!(staging.path().join("shop/orders.bson").is_file());

        let located = locate_backup_dirs(staging.path())?;
        assert_eq!(located, vec![staging.path().join("shop")]);
        Ok(())
    }

    #[test]
    fn test_stage_archive_rejects_unrelated_zip() {
        let workdir = TempDir::new().unwrap();
        let archive_path = workdir.path().join("upload.zip");
        write_zip(&archive_path, &[("report.pdf", b"%PDF"), ("notes.txt", b"hi")]);

        let staging = TempDir::new().unwrap();
        let result = stage_archive(&archive_path, staging.path());
        assert!(matches!(result, Err(AppError::UnrecognizedBackupFormat)));
        // Nothing was extracted.
        assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_stage_archive_rejects_garbage_bytes() {
        let workdir = TempDir::new().unwrap();
        let archive_path = workdir.path().join("upload.zip");
        fs::write(&archive_path, b"not a zip at all").unwrap();

        let staging = TempDir::new().unwrap();
        let result = stage_archive(&archive_path, staging.path());
        assert!(matches!(result, Err(AppError::InvalidArchive(_))));
    }

    #[test]
    fn test_locate_backup_dirs_ignores_platform_metadata() -> Result<()> {
        let staging = TempDir::new()?;
        fs::create_dir(staging.path().join("__MACOSX"))?;
        fs::create_dir(staging.path().join(".hidden"))?;
        fs::create_dir(staging.path().join("shop"))?;
        fs::write(staging.path().join("stray.txt"), b"x")?;

        assert_eq!(
            locate_backup_dirs(staging.path())?,
            vec![staging.path().join("shop")]
        );
        Ok(())
    }

    #[test]
    fn test_locate_backup_dirs_returns_every_database() -> Result<()> {
        let staging = TempDir::new()?;
        fs::create_dir(staging.path().join("shop"))?;
        fs::create_dir(staging.path().join("accounts"))?;

        assert_eq!(
            locate_backup_dirs(staging.path())?,
            vec![staging.path().join("accounts"), staging.path().join("shop")]
        );
        Ok(())
    }

    #[test]
    fn test_locate_backup_dirs_empty_archive() {
        let staging = TempDir::new().unwrap();
        fs::create_dir(staging.path().join("__MACOSX")).unwrap();

        let result = locate_backup_dirs(staging.path());
        assert!(matches!(result, Err(AppError::EmptyArchive)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_multi_database_archive_restores_every_dump_dir() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let workdir = TempDir::new()?;
        let archive_path = workdir.path().join("upload.zip");
        write_zip(
            &archive_path,
            &[
                ("accounts/users.bson", b"\x05\x00\x00\x00\x00"),
                ("shop/orders.bson", b"\x05\x00\x00\x00\x00"),
            ],
        );

        // Fake tool records each invocation's arguments.
        let log = workdir.path().join("invocations.log");
        let tool = workdir.path().join("mongorestore");
        fs::write(
            &tool,
            format!("#!/bin/sh\necho \"$@\" >> {}\nexit 0\n", log.display()),
        )?;
        let mut perms = fs::metadata(&tool)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&tool, perms)?;

        let mut seen = Vec::new();
        run_restore(
            "mongodb://localhost:27017",
            &tool,
            &archive_path,
            "merged",
            |line| seen.push(line.to_string()),
        )
        .await?;

        let calls = fs::read_to_string(&log)?;
        assert_eq!(calls.lines().count(), 2);
        assert!(calls.lines().next().is_some_and(|l| l.contains("/accounts")));
        assert!(calls.lines().nth(1).is_some_and(|l| l.contains("/shop")));
        assert!(seen.iter().any(|l| l.contains("2 database dumps")));
        Ok(())
    }
}
