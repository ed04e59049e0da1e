// mongobackup/src/restore/mongorestore.rs
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;
use which::which;

use crate::errors::{AppError, Result};

/// Finds the mongorestore executable in the system PATH.
pub fn find_mongorestore() -> Result<PathBuf> {
    which("mongorestore").map_err(|_| AppError::ToolNotAvailable {
        tool: "mongorestore",
        hint: crate::backup::mongodump::install_hint(),
    })
}

/// Runs mongorestore, loading `dump_dir` into `target_db`. Existing data in
/// the target is merged, not replaced (no --drop).
///
/// The tool writes its progress to stderr; every line is handed to `on_line`
/// as it arrives. The stream is read to EOF before waiting on the exit
/// status, so a full pipe can never wedge the tool.
pub async fn restore_directory(
    mongorestore: &Path,
    uri: &str,
    target_db: &str,
    dump_dir: &Path,
    mut on_line: impl FnMut(&str),
) -> Result<()> {
    debug!(target = %target_db, source = %dump_dir.display(), "invoking mongorestore");

    let mut child = Command::new(mongorestore)
        .arg(format!("--uri={}", uri))
        .arg(format!("--db={}", target_db))
        .arg(dump_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("mongorestore stderr was not captured"))?;

    let mut captured = Vec::new();
    let mut lines = BufReader::new(stderr).lines();
    while let Some(line) = lines.next_line().await? {
        on_line(&line);
        captured.push(line);
    }

    let status = child.wait().await?;
    if !status.success() {
        return Err(AppError::ToolExecutionError {
            tool: "mongorestore",
            status: status.to_string(),
            stderr: captured.join("\n"),
        });
    }
    Ok(())
}
