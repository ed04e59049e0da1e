//! Pre-flight size estimation.
//!
//! Sums per-collection `collStats` sizes so the backup orchestrator can
//! enforce its size ceiling before any data movement starts. Collections and
//! databases the user cannot read are skipped rather than failing the whole
//! estimate; only a denied top-level database listing is fatal.

use mongodb::Client;
use mongodb::bson::{Bson, Document, doc};
use mongodb::error::ErrorKind;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::errors::{AppError, Result};

/// Per-database byte sizes plus the grand total. Databases with zero
/// accessible bytes are omitted.
#[derive(Debug, Default)]
pub struct SizeReport {
    pub per_database: BTreeMap<String, u64>,
    pub total: u64,
}

/// Progress callback: (databases analyzed so far, database count, current name).
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize, &str) + Send + Sync);

/// Estimates the total size of the given databases, or of all databases on
/// the server when `databases` is `None`.
///
/// Returns `InsufficientPermissions` if the server refuses to enumerate
/// databases, or if nothing at all turns out to be accessible.
pub async fn estimate(
    client: &Client,
    databases: Option<&[String]>,
    progress: Option<ProgressFn<'_>>,
) -> Result<SizeReport> {
    let names: Vec<String> = match databases {
        Some(list) => list.to_vec(),
        None => client
            .list_database_names(None, None)
            .await
            .map_err(classify_listing_error)?,
    };

    let mut report = SizeReport::default();
    let count = names.len();
    for (i, name) in names.iter().enumerate() {
        if let Some(cb) = progress {
            cb(i + 1, count, name);
        }
        let size = database_size(client, name).await;
        debug!(database = %name, size, "database analyzed");
        if size > 0 {
            report.total += size;
            report.per_database.insert(name.clone(), size);
        }
    }

    if report.per_database.is_empty() {
        return Err(AppError::InsufficientPermissions);
    }
    Ok(report)
}

/// Sums collection sizes for one database. Any failure is absorbed: a
/// database or collection we cannot read contributes zero bytes.
async fn database_size(client: &Client, name: &str) -> u64 {
    let db = client.database(name);
    let collections = match db.list_collection_names(None).await {
        Ok(collections) => collections,
        Err(e) => {
            warn!(database = %name, error = %e, "skipping database: cannot list collections");
            return 0;
        }
    };

    let mut total = 0u64;
    for collection in collections {
        match db.run_command(doc! { "collStats": &collection }, None).await {
            Ok(stats) => total += stats_size_bytes(&stats),
            Err(e) => {
                debug!(database = %name, collection = %collection, error = %e,
                    "skipping collection: collStats failed");
            }
        }
    }
    total
}

/// Pulls the `size` field out of a `collStats` reply. The server reports it
/// as int32, int64 or double depending on magnitude.
fn stats_size_bytes(stats: &Document) -> u64 {
    match stats.get("size") {
        Some(Bson::Int32(v)) => (*v).max(0) as u64,
        Some(Bson::Int64(v)) => (*v).max(0) as u64,
        Some(Bson::Double(v)) if *v > 0.0 => *v as u64,
        _ => 0,
    }
}

fn classify_listing_error(e: mongodb::error::Error) -> AppError {
    if is_access_denied(&e) {
        AppError::InsufficientPermissions
    } else {
        AppError::ConnectionError(e.to_string())
    }
}

fn is_access_denied(e: &mongodb::error::Error) -> bool {
    matches!(
        e.kind.as_ref(),
        ErrorKind::Command(_) | ErrorKind::Authentication { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_size_from_int32() {
        let stats = doc! { "size": 4096_i32 };
        assert_eq!(stats_size_bytes(&stats), 4096);
    }

    #[test]
    fn test_stats_size_from_int64() {
        let stats = doc! { "size": 8_589_934_592_i64 };
        assert_eq!(stats_size_bytes(&stats), 8_589_934_592);
    }

    #[test]
    fn test_stats_size_from_double() {
        let stats = doc! { "size": 1536.0 };
        assert_eq!(stats_size_bytes(&stats), 1536);
    }

    #[test]
    fn test_stats_size_missing_or_negative() {
        assert_eq!(stats_size_bytes(&doc! {}), 0);
        assert_eq!(stats_size_bytes(&doc! { "size": -1_i32 }), 0);
        assert_eq!(stats_size_bytes(&doc! { "size": "weird" }), 0);
    }
}
