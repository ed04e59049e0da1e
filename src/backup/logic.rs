// mongobackup/src/backup/logic.rs
use mongodb::Client;
use std::io;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backup::job::{BackupJob, BackupScope, JobStatus};
use crate::backup::{archive, mongodump};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::sizing;
use std::path::PathBuf;

/// Drives one backup job end to end: size gate, per-database or bulk export,
/// ZIP packaging, staging cleanup.
///
/// Cancellation is cooperative: the token is polled before each external tool
/// invocation and before packaging. A cancelled job leaves nothing on disk.
pub async fn run_backup(
    client: &Client,
    uri: &str,
    config: &AppConfig,
    mongodump: &Path,
    scope: BackupScope,
    cancel: &CancellationToken,
) -> Result<BackupJob> {
    let mut job = BackupJob::new(scope);
    info!(job = %job.id, "backup job created");

    // The size cap is enforced pre-flight, never as a running check.
    job.status = JobStatus::Sizing;
    let scope_databases = match &job.scope {
        BackupScope::Databases(dbs) => Some(dbs.as_slice()),
        BackupScope::All => None,
    };
    let progress: sizing::ProgressFn<'_> = &|done, count, name| {
        println!("🔍 Analyzing {} ({}/{})...", name, done, count);
    };
    let report = sizing::estimate(client, scope_databases, Some(progress)).await?;
    job.size_estimate = report.total;
    if let Err(e) = enforce_size_ceiling(report.total, config.max_backup_size) {
        job.status = JobStatus::Failed;
        return Err(e);
    }
    info!(
        total = report.total,
        databases = report.per_database.len(),
        "size gate passed"
    );

    let out_dir = config.backup_root.join(job.dir_name());
    tokio::fs::create_dir_all(&out_dir).await?;

    let (archive_path, archive_size) =
        produce_archive(&mut job, mongodump, uri, &out_dir, cancel).await?;

    job.status = JobStatus::Completed;
    job.archive_path = Some(archive_path);
    job.archive_size = archive_size;
    if job.failed_databases.is_empty() {
        info!(job = %job.id, status = ?job.status, size = archive_size, "backup completed");
    } else {
        warn!(job = %job.id, failed = ?job.failed_databases, "backup completed with failures");
    }
    Ok(job)
}

/// Pre-flight size gate. Nothing is written to disk when the estimate is
/// over the ceiling.
fn enforce_size_ceiling(total: u64, ceiling: u64) -> Result<()> {
    if total > ceiling {
        return Err(AppError::SizeLimitExceeded { total, ceiling });
    }
    Ok(())
}

/// Export and packaging phase. `out_dir` must already exist; on every error
/// path it is removed again, and a cleanup failure is logged rather than
/// allowed to replace the phase's own error.
async fn produce_archive(
    job: &mut BackupJob,
    mongodump: &Path,
    uri: &str,
    out_dir: &Path,
    cancel: &CancellationToken,
) -> Result<(PathBuf, u64)> {
    job.status = JobStatus::Exporting;
    match export_databases(mongodump, uri, &job.scope, out_dir, cancel).await {
        Ok(failed) => job.failed_databases = failed,
        Err(e) => {
            cleanup_staging(out_dir).await;
            job.status = if matches!(e, AppError::Cancelled) {
                JobStatus::Cancelled
            } else {
                JobStatus::Failed
            };
            return Err(e);
        }
    }

    if cancel.is_cancelled() {
        cleanup_staging(out_dir).await;
        job.status = JobStatus::Cancelled;
        return Err(AppError::Cancelled);
    }

    job.status = JobStatus::Packaging;
    let archive_path = out_dir.with_extension("zip");
    let (source, dest) = (out_dir.to_path_buf(), archive_path.clone());
    let packaging =
        match tokio::task::spawn_blocking(move || archive::create_zip_archive(&source, &dest))
            .await
        {
            Ok(result) => result,
            Err(join_err) => {
                cleanup_staging(out_dir).await;
                job.status = JobStatus::Failed;
                return Err(io::Error::other(join_err).into());
            }
        };
    let archive_size = match packaging {
        Ok(size) => size,
        Err(e) => {
            let _ = tokio::fs::remove_file(&archive_path).await;
            cleanup_staging(out_dir).await;
            job.status = JobStatus::Failed;
            return Err(e);
        }
    };

    // The archive is only offered once the uncompressed tree is gone.
    remove_dir_if_present(out_dir).await?;

    Ok((archive_path, archive_size))
}

/// Runs the export tool according to scope. In per-database mode a failing
/// database is recorded and the batch continues; in bulk mode a non-zero exit
/// is fatal because the tool offers no per-database granularity there.
///
/// Returns the list of databases that failed (always empty for bulk mode).
async fn export_databases(
    mongodump: &Path,
    uri: &str,
    scope: &BackupScope,
    out_dir: &Path,
    cancel: &CancellationToken,
) -> Result<Vec<String>> {
    let mut failed = Vec::new();
    match scope {
        BackupScope::Databases(databases) => {
            for db in databases {
                if cancel.is_cancelled() {
                    return Err(AppError::Cancelled);
                }
                match mongodump::dump_database(mongodump, uri, Some(db), out_dir).await {
                    Ok(()) => info!(database = %db, "database dumped"),
                    Err(AppError::ToolExecutionError { stderr, .. }) => {
                        warn!(database = %db, error = %stderr, "dump failed, continuing with remaining databases");
                        failed.push(db.clone());
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        BackupScope::All => {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            mongodump::dump_database(mongodump, uri, None, out_dir).await?;
            info!("all databases dumped in bulk mode");
        }
    }
    Ok(failed)
}

/// Error-path cleanup: the job is already failing, so a failure to remove
/// the staging directory is logged and the original error stands.
async fn cleanup_staging(out_dir: &Path) {
    if let Err(e) = remove_dir_if_present(out_dir).await {
        warn!(dir = %out_dir.display(), error = %e, "failed to remove staging directory");
    }
}

/// Removes a staging directory, treating "already gone" as success; cleanup
/// may race the retention sweeper.
async fn remove_dir_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn write_fake_mongodump(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        // Exits non-zero only when asked for --db=bad.
        let script = "#!/bin/sh\nfor arg in \"$@\"; do\n  case \"$arg\" in\n    --db=bad) echo 'boom' >&2; exit 1;;\n  esac\ndone\nexit 0\n";
        let path = dir.join("mongodump");
        std::fs::write(&path, script).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_partial_failure_collects_exact_error_list() {
        let tools = TempDir::new().unwrap();
        let tool = write_fake_mongodump(tools.path());
        let out = TempDir::new().unwrap();

        let scope = BackupScope::Databases(vec!["good1".into(), "bad".into(), "good2".into()]);
        let failed = export_databases(
            &tool,
            "mongodb://localhost:27017",
            &scope,
            out.path(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(failed, vec!["bad".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bulk_mode_failure_is_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let tools = TempDir::new().unwrap();
        let path = tools.path().join("mongodump");
        std::fs::write(&path, "#!/bin/sh\necho 'bulk boom' >&2\nexit 2\n").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();

        let out = TempDir::new().unwrap();
        let result = export_databases(
            &path,
            "mongodb://localhost:27017",
            &BackupScope::All,
            out.path(),
            &CancellationToken::new(),
        )
        .await;

        match result {
            Err(AppError::ToolExecutionError { stderr, .. }) => {
                assert!(stderr.contains("bulk boom"))
            }
            other => panic!("expected ToolExecutionError, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation_stops_before_next_invocation() {
        let tools = TempDir::new().unwrap();
        let tool = write_fake_mongodump(tools.path());
        let out = TempDir::new().unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let scope = BackupScope::Databases(vec!["good1".into()]);
        let result = export_databases(&tool, "mongodb://localhost:27017", &scope, out.path(), &cancel).await;
        assert!(matches!(result, Err(AppError::Cancelled)));
    }

    #[tokio::test]
    async fn test_remove_dir_if_present_tolerates_missing_dir() {
        let dir = TempDir::new().unwrap();
        let gone = dir.path().join("never_created");
        remove_dir_if_present(&gone).await.unwrap();
    }

    #[test]
    fn test_size_ceiling_rejects_oversized_estimate() {
        match enforce_size_ceiling(110, 100) {
            Err(AppError::SizeLimitExceeded { total, ceiling }) => {
                assert_eq!(total, 110);
                assert_eq!(ceiling, 100);
            }
            other => panic!("expected SizeLimitExceeded, got {other:?}"),
        }
        enforce_size_ceiling(100, 100).unwrap();
        enforce_size_ceiling(0, 100).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancelled_job_removes_staging_dir() {
        let tools = TempDir::new().unwrap();
        let tool = write_fake_mongodump(tools.path());

        let root = TempDir::new().unwrap();
        let out_dir = root.path().join("backup_2dbs_20260101_000000");
        std::fs::create_dir_all(&out_dir).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut job = BackupJob::new(BackupScope::Databases(vec!["good1".into(), "good2".into()]));
        let result = produce_archive(
            &mut job,
            &tool,
            "mongodb://localhost:27017",
            &out_dir,
            &cancel,
        )
        .await;

        assert!(matches!(result, Err(AppError::Cancelled)));
        assert!(matches!(job.status, JobStatus::Cancelled));
        assert!(!out_dir.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_bulk_export_removes_staging_dir() {
        use std::os::unix::fs::PermissionsExt;

        let tools = TempDir::new().unwrap();
        let path = tools.path().join("mongodump");
        std::fs::write(&path, "#!/bin/sh\necho 'bulk boom' >&2\nexit 2\n").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();

        let root = TempDir::new().unwrap();
        let out_dir = root.path().join("backup_all_20260101_000000");
        std::fs::create_dir_all(&out_dir).unwrap();

        let mut job = BackupJob::new(BackupScope::All);
        let result = produce_archive(
            &mut job,
            &path,
            "mongodb://localhost:27017",
            &out_dir,
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(AppError::ToolExecutionError { .. })));
        assert!(matches!(job.status, JobStatus::Failed));
        assert!(!out_dir.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cleanup_failure_does_not_mask_export_error() {
        use std::os::unix::fs::PermissionsExt;

        let tools = TempDir::new().unwrap();
        let path = tools.path().join("mongodump");
        std::fs::write(&path, "#!/bin/sh\necho 'bulk boom' >&2\nexit 2\n").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();

        // A regular file where the staging directory should be: removing it
        // with remove_dir_all fails, but the export error must still win.
        let root = TempDir::new().unwrap();
        let out_dir = root.path().join("backup_all_20260101_000000");
        std::fs::write(&out_dir, b"").unwrap();

        let mut job = BackupJob::new(BackupScope::All);
        let result = produce_archive(
            &mut job,
            &path,
            "mongodb://localhost:27017",
            &out_dir,
            &CancellationToken::new(),
        )
        .await;

        match result {
            Err(AppError::ToolExecutionError { stderr, .. }) => {
                assert!(stderr.contains("bulk boom"))
            }
            other => panic!("expected ToolExecutionError, got {other:?}"),
        }
        assert!(matches!(job.status, JobStatus::Failed));
    }
}
