mod logic;
pub(crate) mod mongorestore;

use std::path::Path;

use crate::errors::Result;

/// Public entry point for the restore process. Validates and extracts the
/// uploaded archive, then loads it into `target_db`. `mongorestore` is the
/// tool path resolved once at startup; progress lines from the tool are
/// handed to `on_line` as they arrive.
pub async fn run_restore_flow(
    uri: &str,
    mongorestore: &Path,
    archive_path: &Path,
    target_db: &str,
    on_line: impl FnMut(&str),
) -> Result<()> {
    logic::run_restore(uri, mongorestore, archive_path, target_db, on_line).await
}
