use chrono::Local;
use std::path::PathBuf;

/// Prefix shared by every backup job directory and archive under the backup
/// root. The retention sweeper only touches entries carrying this prefix.
pub const BACKUP_PREFIX: &str = "backup_";

/// Which databases a backup job covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupScope {
    /// One bulk mongodump invocation covering every database.
    All,
    /// One mongodump invocation per database, in the order given.
    Databases(Vec<String>),
}

impl BackupScope {
    /// Short description embedded in the job directory name.
    pub fn label(&self) -> String {
        match self {
            BackupScope::All => "all".to_string(),
            BackupScope::Databases(dbs) if dbs.len() == 1 => sanitize(&dbs[0]),
            BackupScope::Databases(dbs) => format!("{}dbs", dbs.len()),
        }
    }
}

/// Keeps directory names shell- and filesystem-safe regardless of what the
/// database is called.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Sizing,
    Exporting,
    Packaging,
    Completed,
    Cancelled,
    Failed,
}

/// One user-initiated backup request, from sizing through packaging.
#[derive(Debug)]
pub struct BackupJob {
    /// Doubles as the output directory name: `backup_<scope>_<timestamp>`.
    pub id: String,
    pub scope: BackupScope,
    pub status: JobStatus,
    pub size_estimate: u64,
    pub archive_path: Option<PathBuf>,
    pub archive_size: u64,
    /// Databases whose per-database export failed. The job still completes;
    /// callers must inspect this list.
    pub failed_databases: Vec<String>,
}

impl BackupJob {
    pub fn new(scope: BackupScope) -> Self {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let id = format!("{}{}_{}", BACKUP_PREFIX, scope.label(), timestamp);
        BackupJob {
            id,
            scope,
            status: JobStatus::Pending,
            size_estimate: 0,
            archive_path: None,
            archive_size: 0,
            failed_databases: Vec::new(),
        }
    }

    pub fn dir_name(&self) -> &str {
        &self.id
    }
}
