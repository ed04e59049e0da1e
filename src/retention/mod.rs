//! Background retention sweep.
//!
//! Periodically deletes entries under the backup root that match the backup
//! naming convention and have outlived the retention window. Cleanup is
//! eventually consistent: an artifact is gone within one retention window
//! plus one sweep interval, not exactly at expiry.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backup::job::BACKUP_PREFIX;

/// Starts the sweeper task. It runs until `shutdown` is cancelled; dropping
/// the handle does not stop it.
pub fn spawn_sweeper(
    backup_root: PathBuf,
    retention: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("retention sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = sweep_once(&backup_root, retention) {
                        warn!(error = %e, "retention sweep failed");
                    }
                }
            }
        }
    })
}

/// One sweep cycle. Per-entry failures are logged and skipped; a failing
/// entry never stops the sweep. A missing backup root is not an error.
pub fn sweep_once(backup_root: &Path, retention: Duration) -> io::Result<()> {
    let entries = match fs::read_dir(backup_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(BACKUP_PREFIX) {
            continue;
        }

        // The entry may vanish between listing and stat when racing a job's
        // own cleanup; treat that as already done.
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let Ok(created) = metadata.created().or_else(|_| metadata.modified()) else {
            continue;
        };
        if !is_expired(created, now, retention) {
            continue;
        }

        let path = entry.path();
        let removal = if metadata.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match removal {
            Ok(()) => info!(entry = %path.display(), "removed expired backup"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(entry = %path.display(), error = %e, "failed to remove expired backup"),
        }
    }
    Ok(())
}

fn is_expired(created: SystemTime, now: SystemTime, retention: Duration) -> bool {
    now.duration_since(created)
        .map(|age| age > retention)
        .unwrap_or(false)
}
