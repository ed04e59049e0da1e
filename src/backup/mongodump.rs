// mongobackup/src/backup/mongodump.rs
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;
use which::which;

use crate::errors::{AppError, Result};

/// Finds the mongodump executable in the system PATH. Checked once at
/// startup so a missing tool fails before any job starts.
pub fn find_mongodump() -> Result<PathBuf> {
    which("mongodump").map_err(|_| AppError::ToolNotAvailable {
        tool: "mongodump",
        hint: install_hint(),
    })
}

/// Per-platform install guidance for the MongoDB Database Tools.
pub fn install_hint() -> String {
    if cfg!(target_os = "windows") {
        "Install MongoDB Database Tools from: https://www.mongodb.com/try/download/database-tools"
            .to_string()
    } else if cfg!(target_os = "macos") {
        "Install using Homebrew: brew install mongodb/brew/mongodb-database-tools".to_string()
    } else {
        "Install using apt: sudo apt-get install mongodb-database-tools".to_string()
    }
}

/// Runs mongodump against `out_dir`. With `db = Some(name)` a single
/// database is dumped; with `None` the tool runs in bulk mode and dumps
/// everything the connection can see.
///
/// The connection string goes only to the child process, never to the logs.
pub async fn dump_database(
    mongodump: &Path,
    uri: &str,
    db: Option<&str>,
    out_dir: &Path,
) -> Result<()> {
    let mut cmd = Command::new(mongodump);
    cmd.arg(format!("--uri={}", uri));
    if let Some(db) = db {
        cmd.arg(format!("--db={}", db));
    }
    cmd.arg(format!("--out={}", out_dir.display()));

    debug!(database = db.unwrap_or("<all>"), out = %out_dir.display(), "invoking mongodump");
    let output = cmd.output().await?;

    if !output.status.success() {
        return Err(AppError::ToolExecutionError {
            tool: "mongodump",
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}
