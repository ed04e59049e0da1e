//! MongoDB Backup/Restore Tool
//!
//! Points mongodump/mongorestore at a connection string, packages dumps as
//! downloadable ZIP archives, and reaps old backups on a timer.

// mongobackup/src/main.rs
mod backup;
mod config;
mod errors;
mod restore;
mod retention;
mod sizing;
mod utils;

use anyhow::{Context, Result};
use backup::job::BackupScope;
use config::AppConfig;
use mongodb::bson::doc;
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::errors::AppError;

/// Main entry point for the backup/restore tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_logging();

    match run_app().await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stdout().is_terminal())
        .init();
}

async fn run_app() -> Result<()> {
    let config_path = PathBuf::from("config.json");
    let app_config = AppConfig::load_from_json(&config_path).context(format!(
        "Failed to load application configuration from {}",
        config_path.display()
    ))?;

    // Both tools are required up front; a missing binary should fail here,
    // not halfway through a job.
    let mongodump = backup::mongodump::find_mongodump()?;
    let mongorestore = restore::mongorestore::find_mongorestore()?;

    tokio::fs::create_dir_all(&app_config.backup_root)
        .await
        .with_context(|| {
            format!(
                "Failed to create backup root directory: {}",
                app_config.backup_root.display()
            )
        })?;

    // Stale artifacts are left to the sweeper rather than bulk-deleted at
    // startup; another process may still be serving one of them.
    let shutdown = CancellationToken::new();
    let sweeper = retention::spawn_sweeper(
        app_config.backup_root.clone(),
        app_config.retention,
        app_config.sweep_interval,
        shutdown.clone(),
    );

    let args: Vec<String> = env::args().collect();
    let choice = if args.len() > 1 {
        args[1].trim().to_string()
    } else {
        prompt_choice()?
    };

    let uri = config::mongo_uri_from_env()?;

    let outcome = match choice.as_str() {
        "1" | "backup" => {
            println!("🚀 Starting Backup Process...");
            run_backup(&uri, &app_config, &mongodump).await
        }
        "2" | "restore" => {
            println!("🔄 Starting Restore Process...");
            run_restore(&uri, &mongorestore).await
        }
        _ => {
            println!("❌ Invalid choice. Please enter '1' (backup) or '2' (restore).");
            Err(anyhow::anyhow!("Invalid operation choice"))
        }
    };

    shutdown.cancel();
    let _ = sweeper.await;
    outcome
}

async fn run_backup(uri: &str, app_config: &AppConfig, mongodump: &Path) -> Result<()> {
    let scope = backup_scope_from_env();
    match &scope {
        BackupScope::All => println!("💡 All databases will be backed up."),
        BackupScope::Databases(dbs) => println!("💡 Databases to back up: {:?}", dbs),
    }

    let client = connect(uri).await?;

    // One token per job; Ctrl-C cancels this job only.
    let cancel = CancellationToken::new();
    let watcher = spawn_cancel_watcher(cancel.clone());

    // The job runs in its own task so its blocking work never stalls the
    // sweeper or signal handling.
    let job_result = {
        let client = client.clone();
        let uri = uri.to_string();
        let app_config = app_config.clone();
        let mongodump = mongodump.to_path_buf();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            backup::run_backup_flow(&client, &uri, &app_config, &mongodump, scope, &cancel).await
        })
        .await
    };
    // The job is over either way; a late Ctrl-C must not report a
    // cancellation that can no longer happen.
    watcher.abort();
    let job = job_result
        .context("Backup task panicked")?
        .context("Backup process failed")?;

    println!(
        "📊 Estimated data size: {}",
        utils::format_bytes(job.size_estimate)
    );
    if !job.failed_databases.is_empty() {
        println!(
            "⚠️ {} database(s) failed to export and are missing from the archive: {:?}",
            job.failed_databases.len(),
            job.failed_databases
        );
    }
    if let Some(archive_path) = &job.archive_path {
        println!(
            "📦 Backup archive: {} ({})",
            archive_path.display(),
            utils::format_bytes(job.archive_size)
        );
    }
    println!(
        "⏳ Backup files are automatically deleted after {} hour(s).",
        app_config.retention.as_secs() / 3600
    );
    Ok(())
}

async fn run_restore(uri: &str, mongorestore: &Path) -> Result<()> {
    let archive_file = env::var("ARCHIVE_FILE_PATH")
        .context("ARCHIVE_FILE_PATH must be set for restore (path to the uploaded ZIP)")?;
    let target_db = env::var("TARGET_DATABASE")
        .context("TARGET_DATABASE must be set for restore (new or existing database name)")?;

    println!("Restore target: {}, Archive: {}", target_db, archive_file);

    restore::run_restore_flow(uri, mongorestore, Path::new(&archive_file), &target_db, |line| {
        println!("  {}", line);
    })
    .await
    .context("Restore process failed")?;
    Ok(())
}

/// Builds the backup scope from the DATABASE_LIST environment variable
/// (comma-separated). Absent or empty means all databases.
fn backup_scope_from_env() -> BackupScope {
    match env::var("DATABASE_LIST") {
        Ok(list) => {
            let databases: Vec<String> = list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if databases.is_empty() {
                BackupScope::All
            } else {
                BackupScope::Databases(databases)
            }
        }
        Err(_) => BackupScope::All,
    }
}

/// Spawns a task that cancels the given token on the first Ctrl-C. The
/// caller aborts the handle once its job finishes.
fn spawn_cancel_watcher(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n🛑 Cancellation requested, cleaning up...");
            cancel.cancel();
        }
    })
}

/// Connects to MongoDB and pings the server so an unreachable target fails
/// fast, before any job state is created.
async fn connect(uri: &str) -> Result<mongodb::Client> {
    let parsed = url::Url::parse(uri)
        .map_err(|e| AppError::ConnectionError(format!("invalid connection string: {}", e)))?;
    if !matches!(parsed.scheme(), "mongodb" | "mongodb+srv") {
        return Err(AppError::ConnectionError(
            "connection string must use the mongodb:// or mongodb+srv:// scheme".to_string(),
        )
        .into());
    }

    let mut options = mongodb::options::ClientOptions::parse(uri)
        .await
        .map_err(|e| AppError::ConnectionError(e.to_string()))?;
    options.server_selection_timeout = Some(Duration::from_secs(3));
    options.connect_timeout = Some(Duration::from_secs(3));

    let client = mongodb::Client::with_options(options)
        .map_err(|e| AppError::ConnectionError(e.to_string()))?;
    client
        .database("admin")
        .run_command(doc! { "ping": 1 }, None)
        .await
        .map_err(|e| AppError::ConnectionError(e.to_string()))?;
    Ok(client)
}

/// Prompts user to select backup or restore operation
fn prompt_choice() -> Result<String> {
    use std::io::{Write, stdin, stdout};

    println!("Select an operation:");
    println!("1. Take Backup (or type 'backup')");
    println!("2. Restore Backup (or type 'restore')");
    print!("Enter your choice: ");
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin()
        .read_line(&mut input)
        .context("Failed to read user input")?;
    Ok(input.trim().to_string())
}
