pub(crate) mod archive;
pub mod job;
mod logic;
pub(crate) mod mongodump;

use mongodb::Client;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::errors::Result;
use job::{BackupJob, BackupScope};

/// Public entry point for the backup process. Orchestrates sizing, export,
/// packaging and cleanup for a single job. `mongodump` is the tool path
/// resolved once at startup.
pub async fn run_backup_flow(
    client: &Client,
    uri: &str,
    config: &AppConfig,
    mongodump: &Path,
    scope: BackupScope,
    cancel: &CancellationToken,
) -> Result<BackupJob> {
    logic::run_backup(client, uri, config, mongodump, scope, cancel).await
}
