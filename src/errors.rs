use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{tool} executable not found in PATH. {hint}")]
    ToolNotAvailable { tool: &'static str, hint: String },

    #[error("Failed to connect to MongoDB: {0}")]
    ConnectionError(String),

    #[error("Insufficient permissions to list or read the requested databases")]
    InsufficientPermissions,

    #[error("Total backup size ({total} bytes) exceeds the maximum allowed size ({ceiling} bytes)")]
    SizeLimitExceeded { total: u64, ceiling: u64 },

    #[error("{tool} failed ({status}): {stderr}")]
    ToolExecutionError {
        tool: &'static str,
        status: String,
        stderr: String,
    },

    #[error("Uploaded file is not a valid ZIP archive: {0}")]
    InvalidArchive(String),

    #[error("Archive does not contain any mongodump data files (.bson / .metadata.json)")]
    UnrecognizedBackupFormat,

    #[error("Archive does not contain a backup directory")]
    EmptyArchive,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, AppError>;
